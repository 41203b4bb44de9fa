use std::thread;

use log::debug;
use machine_learning::Batch;
use tokio::sync::mpsc;

use super::Batches;
use crate::{Result, TrainErr};

/// Feeds every batch of `batches` to `f` along with its index in the epoch.
///
/// With `depth > 0` batches are produced on a scoped thread and handed over
/// through a channel holding up to `depth` of them, so loading overlaps with
/// `f`. With `depth == 0` batches are loaded inline.
///
/// # Errors
/// The first error from the iterator or from `f`. The producer stops as soon
/// as the consumer does.
pub fn for_each_batch<F>(batches: Batches<'_>, depth: usize, mut f: F) -> Result<()>
where
    F: FnMut(usize, Batch) -> Result<()>,
{
    if depth == 0 {
        for (i, batch) in batches.enumerate() {
            f(i, batch?)?;
        }

        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel(depth);

    thread::scope(|s| {
        let producer = s.spawn(move || {
            for batch in batches {
                let failed = batch.is_err();
                if tx.blocking_send(batch).is_err() || failed {
                    break;
                }
            }
        });

        let mut ret = Ok(());
        let mut i = 0;

        while let Some(batch) = rx.blocking_recv() {
            if let Err(e) = batch.and_then(|batch| f(i, batch)) {
                ret = Err(e);
                break;
            }

            i += 1;
        }

        drop(rx);
        debug!(batches = i; "prefetch consumer done");

        producer
            .join()
            .map_err(|_| TrainErr::Prefetch("producer thread panicked"))?;

        ret
    })
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2, Array4};

    use super::*;

    fn batch(i: usize) -> Result<Batch> {
        let img = Array4::from_elem((1, 1, 1, 1), i as u8);
        Ok(Batch::new(img, Array1::zeros(0), Array2::zeros((0, 4)), Array1::zeros(0))?)
    }

    fn seen(depth: usize, n: usize) -> Vec<(usize, u8)> {
        let mut out = Vec::new();
        for_each_batch(Box::new((0..n).map(batch)), depth, |i, b| {
            out.push((i, b.img()[[0, 0, 0, 0]]));
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn prefetched_order_matches_inline_order() {
        let inline = seen(0, 9);

        assert_eq!(inline.len(), 9);
        assert_eq!(seen(1, 9), inline);
        assert_eq!(seen(4, 9), inline);
    }

    #[test]
    fn consumer_error_stops_the_producer() {
        let mut calls = 0;
        let err = for_each_batch(Box::new((0..100).map(batch)), 2, |i, _| {
            calls += 1;
            if i == 3 {
                return Err(TrainErr::Data("boom".to_string()));
            }
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, TrainErr::Data(_)));
        assert_eq!(calls, 4);
    }

    #[test]
    fn loader_error_is_returned() {
        let items = (0..5).map(|i| {
            if i == 2 {
                Err(TrainErr::Data("corrupt image".to_string()))
            } else {
                batch(i)
            }
        });

        let mut calls = 0;
        let err = for_each_batch(Box::new(items), 3, |_, _| {
            calls += 1;
            Ok(())
        })
        .unwrap_err();

        assert!(matches!(err, TrainErr::Data(_)));
        assert_eq!(calls, 2);
    }
}
