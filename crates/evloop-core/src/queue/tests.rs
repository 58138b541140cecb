use std::{
    thread,
    time::{Duration, Instant},
};

use super::*;

#[test]
fn drain_all_empty() -> anyhow::Result<()> {
    let queue = EventQueue::<u32>::default();

    assert!(queue.drain_all().is_empty());
    assert!(queue.is_empty());

    Ok(())
}

#[test]
fn drain_all_preserves_order_and_empties_queue() -> anyhow::Result<()> {
    let queue = EventQueue::default();

    for item in 1..=5 {
        queue.enqueue(item)?;
    }
    assert_eq!(5, queue.len());

    let drained = queue.drain_all();
    assert_eq!(vec![1, 2, 3, 4, 5], drained.into_iter().collect::<Vec<_>>());
    assert!(queue.is_empty());
    assert!(queue.drain_all().is_empty());

    Ok(())
}

#[test]
fn bounded_queue_rejects_when_full() -> anyhow::Result<()> {
    let queue = EventQueue::bounded(NonZeroUsize::new(2).unwrap());

    queue.enqueue(1)?;
    queue.enqueue(2)?;
    match queue.enqueue(3) {
        Err(EnqueueError::Full { capacity, item }) => {
            assert_eq!(2, capacity);
            assert_eq!(3, item);
        }
        unexpected => panic!("unexpected result: {unexpected:?}"),
    }

    // Space becomes available again after draining
    assert_eq!(2, queue.drain_all().len());
    queue.enqueue(3)?;

    Ok(())
}

#[test]
fn enqueue_unbounded_ignores_capacity() -> anyhow::Result<()> {
    let queue = EventQueue::bounded(NonZeroUsize::new(1).unwrap());

    queue.enqueue(1)?;
    queue.enqueue_unbounded(2)?;
    assert_eq!(2, queue.len());

    Ok(())
}

#[test]
fn closed_queue_rejects_items() -> anyhow::Result<()> {
    let queue = EventQueue::default();

    queue.enqueue(1)?;
    queue.enqueue(2)?;
    assert!(!queue.is_closed());

    let pending = queue.close();
    assert_eq!(vec![1, 2], pending.into_iter().collect::<Vec<_>>());
    assert!(queue.is_closed());
    assert!(queue.is_empty());

    assert_eq!(3, queue.enqueue(3).unwrap_err().into_item());
    assert!(matches!(
        queue.enqueue_unbounded(4),
        Err(EnqueueError::Closed { item: 4 })
    ));
    assert!(queue.is_empty());

    Ok(())
}

#[test]
fn wait_swap_all_reuses_batch_buffer() -> anyhow::Result<()> {
    let queue = EventQueue::default();
    let mut batch = VecDeque::with_capacity(16);

    queue.enqueue('a')?;
    queue.enqueue('b')?;
    queue.wait_swap_all(&mut batch);
    assert_eq!(vec!['a', 'b'], batch.drain(..).collect::<Vec<_>>());

    // The empty batch buffer has been handed over to the queue
    queue.enqueue('c')?;
    queue.wait_swap_all(&mut batch);
    assert_eq!(vec!['c'], batch.drain(..).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn wait_swap_all_until_deadline_expired() -> anyhow::Result<()> {
    let queue = EventQueue::<()>::default();
    let mut batch = VecDeque::new();

    assert!(!queue.wait_swap_all_until(&mut batch, Instant::now()));
    assert!(batch.is_empty());

    Ok(())
}

#[test]
fn wait_swap_all_until_ready() -> anyhow::Result<()> {
    let queue = EventQueue::default();
    let mut batch = VecDeque::new();

    queue.enqueue(())?;

    assert!(queue.wait_swap_all_until(&mut batch, Instant::now() + Duration::from_secs(60)));
    assert_eq!(1, batch.len());

    Ok(())
}

#[test]
fn wait_swap_all_wakes_up_on_enqueue() -> anyhow::Result<()> {
    let queue = EventQueue::default();

    thread::scope(|scope| {
        let consumer = scope.spawn(|| {
            let mut batch = VecDeque::new();
            queue.wait_swap_all(&mut batch);
            batch
        });
        thread::sleep(Duration::from_millis(10));
        queue.enqueue(42).unwrap();
        let batch = consumer.join().unwrap();
        assert_eq!(Some(&42), batch.front());
    });

    Ok(())
}

#[test]
fn concurrent_producers_lose_nothing() -> anyhow::Result<()> {
    const PRODUCERS: usize = 4;
    const ITEMS_PER_PRODUCER: usize = 1_000;

    let queue = EventQueue::default();

    let mut received = Vec::with_capacity(PRODUCERS * ITEMS_PER_PRODUCER);
    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let queue = &queue;
            scope.spawn(move || {
                for seq in 0..ITEMS_PER_PRODUCER {
                    queue.enqueue((producer, seq)).unwrap();
                }
            });
        }
        let mut batch = VecDeque::new();
        while received.len() < PRODUCERS * ITEMS_PER_PRODUCER {
            queue.wait_swap_all(&mut batch);
            received.extend(batch.drain(..));
        }
    });

    assert!(queue.is_empty());
    for producer in 0..PRODUCERS {
        let sequence = received
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, seq)| *seq)
            .collect::<Vec<_>>();
        assert_eq!((0..ITEMS_PER_PRODUCER).collect::<Vec<_>>(), sequence);
    }

    Ok(())
}
