//! Tests for in-order batched persistence of job slots

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tilemosaic::io::configuration::WRITE_BATCH_SIZE;
    use tilemosaic::io::error::worker_pool_error;
    use tilemosaic::workers::slot::JobSlot;
    use tilemosaic::workers::writer::AsyncWriter;

    fn slots(count: usize) -> Arc<[JobSlot<usize, usize>]> {
        (0..count).map(JobSlot::new).collect::<Vec<_>>().into()
    }

    // Tests results are persisted in slot order even when completed in reverse
    // Verified by persisting results in completion order
    #[test]
    fn test_persists_in_slot_order() {
        let slots = slots(10);
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&persisted);

        let writer = AsyncWriter::spawn(Arc::clone(&slots), move |batch: &[usize]| {
            sink.lock().extend_from_slice(batch);
            Ok(())
        });
        let Ok(writer) = writer else {
            unreachable!("writer should start");
        };

        for slot in slots.iter().rev() {
            slot.complete(Some(slot.input() * 10));
            thread::sleep(Duration::from_millis(1));
        }

        assert!(matches!(writer.join(), Ok(10)));
        let expected: Vec<usize> = (0..10).map(|i| i * 10).collect();
        assert_eq!(*persisted.lock(), expected);
    }

    // Tests failed slots are skipped without stalling the cursor
    // Verified by waiting for a result on failed slots
    #[test]
    fn test_skips_failed_slots() {
        let slots = slots(5);
        for slot in slots.iter() {
            let result = (slot.input() % 2 == 0).then(|| *slot.input());
            slot.complete(result);
        }

        let persisted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&persisted);
        let writer = AsyncWriter::spawn(Arc::clone(&slots), move |batch: &[usize]| {
            sink.lock().extend_from_slice(batch);
            Ok(())
        });
        let Ok(writer) = writer else {
            unreachable!("writer should start");
        };

        assert!(matches!(writer.join(), Ok(3)));
        assert_eq!(*persisted.lock(), vec![0, 2, 4]);
    }

    // Tests batches never exceed the configured size
    // Verified by flushing only at the end
    #[test]
    fn test_batch_size_limit() {
        let count = WRITE_BATCH_SIZE * 2 + 5;
        let slots = slots(count);
        for slot in slots.iter() {
            slot.complete(Some(*slot.input()));
        }

        let sizes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sizes);
        let writer = AsyncWriter::spawn(Arc::clone(&slots), move |batch: &[usize]| {
            sink.lock().push(batch.len());
            Ok(())
        });
        let Ok(writer) = writer else {
            unreachable!("writer should start");
        };

        assert!(matches!(writer.join(), Ok(n) if n == count));
        let sizes = sizes.lock();
        assert!(sizes.iter().all(|&size| size <= WRITE_BATCH_SIZE));
        assert_eq!(sizes.iter().sum::<usize>(), count);
    }

    // Tests the frontier reaches the end when every slot failed
    // Verified by advancing the frontier only after a flush
    #[test]
    fn test_frontier_covers_failed_slots() {
        let slots = slots(7);
        for slot in slots.iter() {
            slot.complete(None);
        }
        let writer = AsyncWriter::spawn(Arc::clone(&slots), |_: &[usize]| Ok(()));
        let Ok(writer) = writer else {
            unreachable!("writer should start");
        };
        while !writer.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(writer.frontier(), 7);
        assert!(matches!(writer.join(), Ok(0)));
    }

    // Tests a persistence failure is returned from join
    // Verified by ignoring the persist result
    #[test]
    fn test_persist_error_propagates() {
        let slots = slots(3);
        for slot in slots.iter() {
            slot.complete(Some(1));
        }
        let writer = AsyncWriter::spawn(Arc::clone(&slots), |_: &[usize]| {
            Err(worker_pool_error(&"disk full"))
        });
        let Ok(writer) = writer else {
            unreachable!("writer should start");
        };
        assert!(writer.join().is_err());
    }
}
