//! One barrier-synchronized exchange round with bounded retries.
//!
//! Every participant sends one message to each peer, then waits for one message
//! from each peer. A message is tagged with the round number; messages from
//! earlier rounds are resent duplicates and are dropped. When a peer stays silent
//! for `timeout`, this rank's message is resent; after `max_retries` resends the
//! round fails with [`AmrError::ExchangeTimeout`].

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::BoundaryMessage;
use crate::amr_error::AmrError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Tag offsets relative to [`AdaptConfig::tag_base`](crate::adapt::AdaptConfig).
pub const TAG_DELTAS: CommTag = 0;
pub const TAG_VOTE: CommTag = 1;
pub const TAG_PROPOSALS: CommTag = 2;
pub const TAG_COMMIT: CommTag = 3;

/// Timeouts and retry budget of an exchange round.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOptions {
    /// How long to wait for a peer before resending.
    pub timeout: Duration,
    /// Resends before giving up on a peer.
    pub max_retries: u32,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

/// Send `outgoing[peer]` to every peer in `peers` and collect one message from each.
///
/// Peers missing from `outgoing` get nothing and are only received from.
pub fn exchange_round<C>(
    comm: &C,
    tag: CommTag,
    round: u32,
    peers: &[usize],
    outgoing: &BTreeMap<usize, BoundaryMessage>,
    opts: &ExchangeOptions,
) -> Result<BTreeMap<usize, BoundaryMessage>, AmrError>
where
    C: Communicator + ?Sized,
{
    let encoded: BTreeMap<usize, Vec<u8>> = outgoing
        .iter()
        .map(|(&peer, msg)| (peer, msg.encode(round)))
        .collect();
    for (&peer, bytes) in &encoded {
        comm.send(peer, tag, bytes)?;
    }

    let mut received = BTreeMap::new();
    for &peer in peers {
        let mut attempts = 0u32;
        let mut deadline = Instant::now() + opts.timeout;
        let msg = loop {
            if let Some(bytes) = comm.try_recv(peer, tag)? {
                let (r, msg) = BoundaryMessage::decode(&bytes)?;
                if r == round {
                    break msg;
                }
                if r < round {
                    log::trace!("rank {}: dropping stale round {r} message from {peer}", comm.rank());
                    continue;
                }
                return Err(AmrError::ProtocolViolation {
                    peer,
                    reason: format!("message for round {r} while in round {round}"),
                });
            }
            if Instant::now() < deadline {
                std::thread::yield_now();
                continue;
            }
            attempts += 1;
            if attempts > opts.max_retries {
                return Err(AmrError::ExchangeTimeout {
                    peer,
                    round,
                    attempts,
                });
            }
            log::warn!(
                "rank {}: no round {round} message from {peer}; retry {attempts}/{}",
                comm.rank(),
                opts.max_retries
            );
            if let Some(bytes) = encoded.get(&peer) {
                comm.send(peer, tag, bytes)?;
            }
            deadline = Instant::now() + opts.timeout;
        };
        received.insert(peer, msg);
    }
    Ok(received)
}
