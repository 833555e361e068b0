use std::{
    cell::{Cell, RefCell},
    future::{poll_fn, Future, IntoFuture},
    pin::{pin, Pin},
    rc::Rc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use cotask::{Builder, Error, Handle, LocalExecutor, Task};

fn init() {
    let _ = env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Counts how many times the wrapped future is polled.
struct CountPolls<F> {
    inner: Pin<Box<F>>,
    polls: Rc<Cell<usize>>,
}

impl<F: Future> Future for CountPolls<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        self.polls.set(self.polls.get() + 1);
        self.inner.as_mut().poll(cx)
    }
}

fn count_polls<F: Future>(future: F) -> (CountPolls<F>, Rc<Cell<usize>>) {
    let polls = Rc::new(Cell::new(0));
    (
        CountPolls {
            inner: Box::pin(future),
            polls: polls.clone(),
        },
        polls,
    )
}

#[test]
fn roots_run_in_spawn_order() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();
    let order = Rc::new(RefCell::new(Vec::new()));

    for i in 0..32 {
        let order = order.clone();
        ex.spawn(Task::new(&handle, async move {
            order.borrow_mut().push(i);
        }));
    }

    ex.run().unwrap();
    assert_eq!(*order.borrow(), (0..32).collect::<Vec<_>>());
}

#[test]
fn parent_is_resumed_exactly_once_per_child_completion() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();

    let h = handle.clone();
    let (body, parent_polls) = count_polls(async move {
        for _ in 0..3 {
            let hh = h.clone();
            Task::new(&h, async move {
                hh.delay(Duration::from_millis(5)).await.unwrap();
            })
            .await
            .unwrap();
        }
    });

    let join = ex.spawn(Task::new(&handle, body));
    let report = ex.run().unwrap();

    assert!(join.is_finished());
    // first resume, then one resume per finished child
    assert_eq!(parent_polls.get(), 1 + 3);
    assert_eq!(report.completed, 4);
}

#[test]
fn awaiting_a_child_starts_it_before_the_parent_suspends() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();
    let events = Rc::new(RefCell::new(Vec::new()));

    let h = handle.clone();
    let e = events.clone();
    ex.spawn(Task::new(&handle, async move {
        let ee = e.clone();
        let hh = h.clone();
        let child = Task::new(&h, async move {
            ee.borrow_mut().push("child started");
            hh.delay(Duration::from_millis(5)).await.unwrap();
            ee.borrow_mut().push("child finished");
        });

        e.borrow_mut().push("parent awaits");
        child.await.unwrap();
        e.borrow_mut().push("parent resumed");
    }));

    // a single resume of the parent also runs the child up to its leaf
    assert!(ex.tick().unwrap());
    assert_eq!(*events.borrow(), ["parent awaits", "child started"]);

    ex.run().unwrap();
    assert_eq!(
        *events.borrow(),
        [
            "parent awaits",
            "child started",
            "child finished",
            "parent resumed"
        ]
    );
}

#[test]
fn constructing_a_task_runs_nothing() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();
    let ran = Rc::new(Cell::new(false));

    let r = ran.clone();
    let task = Task::new(&handle, async move { r.set(true) });
    assert!(!ran.get());

    drop(task);
    assert_eq!(ex.run().unwrap().resumptions, 0);
    assert!(!ran.get());
}

#[test]
fn leaf_is_not_ready_on_first_check() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();

    let h = handle.clone();
    let mut join = ex.spawn(Task::new(&handle, async move {
        let mut delay = pin!(h.delay(Duration::ZERO));
        let first_pending = poll_fn(|cx| Poll::Ready(delay.as_mut().poll(cx).is_pending())).await;
        delay.await.unwrap();
        first_pending
    }));

    ex.run().unwrap();
    assert_eq!(join.try_take(), Some(Ok(true)));
}

#[test]
fn each_task_observes_its_own_leaves_in_order() {
    init();

    const UNIT: Duration = Duration::from_millis(20);

    let mut ex = Builder::new().worker_threads(2).build().unwrap();
    let handle = ex.handle();
    let milestones = Rc::new(RefCell::new(Vec::new()));

    let h = handle.clone();
    let m = milestones.clone();
    ex.spawn(
        Task::new(&handle, async move {
            for units in [3u32, 2, 4, 1] {
                h.delay(UNIT * units).await.unwrap();
                m.borrow_mut().push(("a", units, Instant::now()));
            }
        })
        .with_label("a"),
    );

    let h = handle.clone();
    let m = milestones.clone();
    let b_start = Rc::new(Cell::new(None));
    let bs = b_start.clone();
    ex.spawn(
        Task::new(&handle, async move {
            bs.set(Some(Instant::now()));
            h.delay(UNIT * 7).await.unwrap();
            m.borrow_mut().push(("b", 7, Instant::now()));
        })
        .with_label("b"),
    );

    ex.run().unwrap();

    let milestones = milestones.borrow();
    let a: Vec<_> = milestones
        .iter()
        .filter(|(task, ..)| *task == "a")
        .map(|(_, units, _)| *units)
        .collect();
    assert_eq!(a, [3, 2, 4, 1]);

    let b: Vec<_> = milestones.iter().filter(|(task, ..)| *task == "b").collect();
    assert_eq!(b.len(), 1);
    let b_elapsed = b[0].2 - b_start.get().unwrap();
    assert!(b_elapsed >= UNIT * 7);
}

#[test]
fn every_leaf_completion_resumes_its_task_once() {
    init();

    const N: usize = 64;

    let mut ex = Builder::new().worker_threads(4).build().unwrap();
    let handle = ex.handle();
    let resumed = Rc::new(Cell::new(0));

    for i in 0..N {
        let h = handle.clone();
        let resumed = resumed.clone();
        ex.spawn(Task::new(&handle, async move {
            let value = h
                .offload(move || {
                    std::thread::sleep(Duration::from_millis(1));
                    i
                })
                .await
                .unwrap();
            assert_eq!(value, i);
            resumed.set(resumed.get() + 1);
        }));
    }

    let report = ex.run().unwrap();
    assert_eq!(resumed.get(), N);
    assert_eq!(report.completed, N);
    // initial resume plus exactly one resume per leaf completion
    assert_eq!(report.resumptions, 2 * N);
}

#[test]
fn failures_propagate_through_question_mark() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();

    async fn outer(h: Handle) -> Result<u32, Error> {
        let hh = h.clone();
        let inner = Task::new(&h, async move {
            hh.delay(Duration::from_millis(1)).await?;
            if hh.current_task().is_some() {
                panic!("inner gave up");
            }
            Ok::<u32, Error>(1)
        })
        .with_label("inner");

        let value = inner.await??;
        Ok(value + 1)
    }

    let mut join = ex.spawn(Task::new(&handle, outer(handle.clone())));
    let report = ex.run().unwrap();

    match join.try_take() {
        Some(Ok(Err(Error::Task(err)))) => assert_eq!(err.label(), Some("inner")),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(report.root_failures.is_empty());
}

#[test]
fn executors_are_isolated() {
    init();

    let mut first = LocalExecutor::new().unwrap();
    let mut second = LocalExecutor::new().unwrap();

    let h1 = first.handle();
    let h2 = second.handle();

    let mut a = first.spawn(Task::new(&h1, async { "first" }));
    let mut b = second.spawn(Task::new(&h2, async { "second" }));

    first.run().unwrap();
    assert!(!b.is_finished());
    assert_eq!(a.try_take(), Some(Ok("first")));

    second.run().unwrap();
    assert_eq!(b.try_take(), Some(Ok("second")));
}

#[test]
fn shutdown_does_not_wait_for_pending_sleeps() {
    init();

    let mut ex = Builder::new().exit_when_idle(false).build().unwrap();
    let handle = ex.handle();

    let h = handle.clone();
    let stopper = ex.stopper();
    let join = ex.spawn(Task::new(&handle, async move {
        let long = Task::new(&h, {
            let h = h.clone();
            async move {
                h.delay(Duration::from_secs(60)).await.unwrap();
            }
        });
        stopper.stop();
        long.await.unwrap();
    }));

    ex.run().unwrap();
    assert!(!join.is_finished());
    assert_eq!(ex.live_tasks(), 2);

    let start = Instant::now();
    ex.shutdown();
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn finished_child_queues_its_parent_behind_ready_tasks() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();
    let events = Rc::new(RefCell::new(Vec::new()));

    let h = handle.clone();
    let e = events.clone();
    ex.spawn(Task::new(&handle, async move {
        let hh = h.clone();
        let ee = e.clone();
        Task::new(&h, async move {
            hh.delay(Duration::from_millis(1)).await.unwrap();
            ee.borrow_mut().push("child done");

            // queued before the parent, which is only queued once this child returns
            let eee = ee.clone();
            hh.spawn(Task::new(&hh, async move {
                eee.borrow_mut().push("other root");
            }));
        })
        .await
        .unwrap();

        e.borrow_mut().push("parent resumed");
    }));

    ex.run().unwrap();
    assert_eq!(
        *events.borrow(),
        ["child done", "other root", "parent resumed"]
    );
}

/// Polls a child once, so it is started and registered, then drops it.
async fn start_and_abandon<T: 'static>(child: Task<T>) {
    let mut awaited = Some(child.into_future());
    poll_fn(|cx| {
        if let Some(awaited) = awaited.as_mut() {
            assert!(Pin::new(awaited).poll(cx).is_pending());
        }
        Poll::Ready(())
    })
    .await;
    drop(awaited);
}

#[test]
fn abandoned_child_still_runs_to_completion() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();
    let finished = Rc::new(Cell::new(false));

    let h = handle.clone();
    let f = finished.clone();
    let mut parent = ex.spawn(Task::new(&handle, async move {
        let hh = h.clone();
        let child = Task::new(&h, async move {
            hh.delay(Duration::from_millis(5)).await.unwrap();
            f.set(true);
        });
        start_and_abandon(child).await;
        "parent done"
    }));

    let report = ex.run().unwrap();
    assert_eq!(parent.try_take(), Some(Ok("parent done")));
    assert!(finished.get());
    assert_eq!(report.completed, 2);
    assert!(report.root_failures.is_empty());
}

#[test]
fn abandoned_child_failure_reaches_the_root_sink() {
    init();

    let mut ex = LocalExecutor::new().unwrap();
    let handle = ex.handle();

    let h = handle.clone();
    let mut parent = ex.spawn(Task::new(&handle, async move {
        let hh = h.clone();
        let child = Task::new(&h, async move {
            hh.delay(Duration::from_millis(5)).await.unwrap();
            if hh.current_task().is_some() {
                panic!("abandoned child failed");
            }
        })
        .with_label("abandoned");
        start_and_abandon(child).await;
    }));

    let report = ex.run().unwrap();
    assert_eq!(parent.try_take(), Some(Ok(())));
    assert_eq!(report.failed, 1);
    assert_eq!(report.root_failures.len(), 1);
    assert_eq!(report.root_failures[0].label(), Some("abandoned"));
}
