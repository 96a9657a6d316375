use mct_queue::BlockingQueue;
use serial_test::serial;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn pop_blocks_until_push() -> anyhow::Result<()> {
    let q = Arc::new(BlockingQueue::<i32>::new());
    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let consumer = {
        let (q, started, finished) = (q.clone(), started.clone(), finished.clone());
        thread::spawn(move || {
            started.store(true, Ordering::SeqCst);
            let v = q.pop();
            finished.store(true, Ordering::SeqCst);
            v
        })
    };

    while !started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(50));
    assert!(!finished.load(Ordering::SeqCst), "pop returned on an empty queue");

    q.push(42);
    let got = consumer.join().map_err(|_| anyhow::anyhow!("consumer panicked"))?;
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(got, Some(42));
    Ok(())
}

#[test]
#[serial]
fn stop_unblocks_every_waiter() -> anyhow::Result<()> {
    let q = Arc::new(BlockingQueue::<u32>::new());
    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || q.pop())
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    let stopped_at = Instant::now();
    q.stop();

    for c in consumers {
        let v = c.join().map_err(|_| anyhow::anyhow!("consumer panicked"))?;
        assert_eq!(v, None);
    }
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[test]
fn multiple_producers_and_consumers_lose_nothing() -> anyhow::Result<()> {
    const PRODUCERS: u32 = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: u32 = 25;

    let q = Arc::new(BlockingQueue::<u32>::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let consumed = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    q.push(p * 1000 + i);
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let (q, seen, consumed) = (q.clone(), seen.clone(), consumed.clone());
            thread::spawn(move || {
                let mut local = Vec::new();
                while let Some(v) = q.pop() {
                    consumed.fetch_add(1, Ordering::Relaxed);
                    local.push(v);
                }
                seen.lock().unwrap().extend(local);
            })
        })
        .collect();

    for p in producers {
        p.join().map_err(|_| anyhow::anyhow!("producer panicked"))?;
    }
    q.stop();
    for c in consumers {
        c.join().map_err(|_| anyhow::anyhow!("consumer panicked"))?;
    }

    let total = (PRODUCERS * PER_PRODUCER) as usize;
    assert_eq!(consumed.load(Ordering::Relaxed), total);

    let seen = seen.lock().unwrap();
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(seen.len(), total);
    assert_eq!(unique.len(), total, "an item was delivered twice");
    for p in 0..PRODUCERS {
        for i in 0..PER_PRODUCER {
            assert!(unique.contains(&(p * 1000 + i)), "missing {}", p * 1000 + i);
        }
    }
    Ok(())
}

#[test]
fn order_is_preserved_per_producer() {
    const PER_PRODUCER: u32 = 200;
    let q = Arc::new(BlockingQueue::<(u32, u32)>::new());

    let producers: Vec<_> = (0..3)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    q.push((p, seq));
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    q.stop();

    // a single consumer sees each producer's items in push order
    let mut next = [0u32; 3];
    for (p, seq) in q.iter() {
        assert_eq!(seq, next[p as usize], "producer {p} reordered");
        next[p as usize] += 1;
    }
    assert_eq!(next, [PER_PRODUCER; 3]);
}

#[test]
#[serial]
fn pop_timeout_wakes_on_stop() {
    let q = Arc::new(BlockingQueue::<u8>::new());
    let waiter = {
        let q = q.clone();
        thread::spawn(move || {
            let start = Instant::now();
            (q.pop_timeout(Duration::from_secs(10)), start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(20));
    q.stop();
    let (v, waited) = waiter.join().unwrap();
    assert_eq!(v, None);
    assert!(waited < Duration::from_secs(5));
}
