//! The parallel group join: distribute independent key groups over a pool
//! of worker threads and reduce their partial count tables by summation.
//!
//! Determinism: the merged counts do not depend on how groups land on
//! workers, because summation is commutative and associative. Any worker
//! count ≥ 1 yields identical edge weights.

use crate::cancel::CancelToken;
use crate::error::Cancelled;
use crate::network::EdgeCounts;
use crate::store::JoinEvent;
use crate::window::{PairPolicy, emit_group};

/// Join parameters shared by every network kind.
#[derive(Debug, Clone)]
pub struct JoinOptions {
  /// The time window W in seconds; the pair test is `|Δt| ≤ W`.
  pub window:  f64,
  /// Worker thread count; clamped to at least 1.
  pub workers: usize,
}

/// Run the sliding window over every group and aggregate the emitted pairs.
///
/// Groups are fed to workers over a bounded channel; each worker folds its
/// groups into a private [`EdgeCounts`] and ships it to the reducer when the
/// dispatch channel closes. The first cancellation observed trips the shared
/// flag so siblings exit promptly, and nothing is returned.
pub fn join_groups(
  groups: Vec<Vec<JoinEvent>>,
  policy: &PairPolicy,
  options: &JoinOptions,
  cancel: &CancelToken,
) -> Result<EdgeCounts, Cancelled> {
  let workers = options.workers.max(1);

  let (group_tx, group_rx) =
    crossbeam_channel::bounded::<Vec<JoinEvent>>(workers * 2);
  let (result_tx, result_rx) =
    crossbeam_channel::bounded::<Result<EdgeCounts, Cancelled>>(workers);

  let merged = std::thread::scope(|scope| {
    for _ in 0..workers {
      let group_rx = group_rx.clone();
      let result_tx = result_tx.clone();
      let policy = policy.clone();
      let cancel = cancel.clone();
      let window = options.window;

      scope.spawn(move || {
        let mut local = EdgeCounts::new();
        let mut outcome = Ok(());

        for group in group_rx {
          if let Err(e) =
            emit_group(&group, window, &policy, &mut local, &cancel)
          {
            cancel.cancel();
            outcome = Err(e);
            break;
          }
        }

        // The reducer owns its receiver until every worker reports; the
        // buffer is sized so this send never blocks.
        let _ = result_tx.send(outcome.map(|()| local));
      });
    }
    drop(result_tx);

    // Feed groups from this thread, then close the channel so workers
    // drain and report.
    for group in groups {
      if cancel.is_cancelled() || group_tx.send(group).is_err() {
        break;
      }
    }
    drop(group_tx);

    let mut merged = EdgeCounts::new();
    let mut first_err = None;
    for result in result_rx {
      match result {
        Ok(partial) => merged.merge(partial),
        Err(e) => {
          first_err.get_or_insert(e);
        }
      }
    }

    match first_err {
      None => Ok(merged),
      Some(e) => Err(e),
    }
  });

  if cancel.is_cancelled() {
    return Err(Cancelled);
  }
  merged
}

// ─── Tests ───────────────────────────────────────────────────────────────────
