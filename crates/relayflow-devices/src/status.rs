/*!
 * Status decoding.
 *
 * A status frame is `statuslength` bytes read as one big-endian unsigned
 * word. Each channel reports on when any bit of its status mask is set.
 */
use tracing::warn;

use relayflow_core::logging::STATE;

use crate::catalog::MAX_STATUS_LENGTH;
use crate::error::{DeviceError, Result};
use crate::module::ValidatedModule;

/// Decode a status frame into `(channel index, state)` pairs.
///
/// Pairs follow the module's channel declaration order. A frame whose
/// length differs from the module's status length is an error: it means
/// the stream is out of step, not that channels changed.
pub fn try_decode(module: &ValidatedModule, payload: &[u8]) -> Result<Vec<(u32, bool)>> {
    let expected = module.status_length();
    if payload.len() != expected || expected > MAX_STATUS_LENGTH {
        return Err(DeviceError::FrameLength {
            expected,
            actual: payload.len(),
        });
    }

    let word = payload
        .iter()
        .fold(0u64, |word, byte| (word << 8) | u64::from(*byte));

    Ok(module
        .channels()
        .iter()
        .map(|channel| (channel.index, word & channel.status_mask != 0))
        .collect())
}

/// Decode a status frame, discarding malformed frames.
///
/// This is [`try_decode`] with the error logged and an empty result in its
/// place, so a bad frame never turns into a state update.
pub fn decode(module: &ValidatedModule, payload: &[u8]) -> Vec<(u32, bool)> {
    match try_decode(module, payload) {
        Ok(states) => states,
        Err(e) => {
            warn!(target: STATE, "module {}: discarding status frame: {}", module.id(), e);
            Vec::new()
        }
    }
}
