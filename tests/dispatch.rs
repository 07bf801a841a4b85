// Integration tests for batched dispatch against the simulated controller

use griddle_plotter::controller::sim::{SimCommand, SimEvent};
use griddle_plotter::{
    CommandQueue, ControllerError, DispatchError, DispatchSettings, Dispatcher, MoveMode, Operation,
    ProgressSink, QueueIndex, SimController, ToolState,
};
use std::time::Duration;
use tokio_test::assert_ok;

fn settings(chunk_size: usize, capacity: usize) -> DispatchSettings {
    DispatchSettings {
        chunk_size,
        buffer_capacity: capacity,
        poll_interval: Duration::from_millis(200),
        drain_timeout: Duration::from_secs(30),
        move_mode: MoveMode::Linear,
    }
}

fn moves(n: usize) -> Vec<Operation> {
    (0..n)
        .map(|i| Operation::Move { x: i as f64, y: 0.0, z: 1.0 })
        .collect()
}

#[derive(Default)]
struct Recorder {
    calls: Vec<usize>,
}

impl ProgressSink for Recorder {
    fn render(&mut self, _sequence: &[Operation], progress_index: usize) {
        self.calls.push(progress_index);
    }
}

/// Splits the event log into per-batch groups, each starting at its first enqueue.
fn batches_from_events(events: &[SimEvent]) -> Vec<Vec<SimEvent>> {
    let mut batches: Vec<Vec<SimEvent>> = Vec::new();
    let mut in_batch = false;
    for event in events {
        match event {
            SimEvent::Enqueue { .. } if !in_batch => {
                batches.push(vec![event.clone()]);
                in_batch = true;
            }
            SimEvent::Clear => {
                if let Some(batch) = batches.last_mut().filter(|_| in_batch) {
                    batch.push(event.clone());
                }
                in_batch = false;
            }
            _ => {
                if let Some(batch) = batches.last_mut().filter(|_| in_batch) {
                    batch.push(event.clone());
                }
            }
        }
    }
    batches
}

#[tokio::test(start_paused = true)]
async fn test_batches_preserve_order_and_size() {
    let queue = CommandQueue::from_ops(moves(57));
    let sim = SimController::new(32).with_drain_per_poll(7);
    let mut dispatcher = Dispatcher::new(sim, settings(25, 32)).unwrap();

    let mut progress = Recorder::default();
    let report = dispatcher.dispatch(queue.ops(), &mut progress).await.unwrap();

    // 58 operations in chunks of 25: 25, 25, 8
    assert_eq!(report.batches, 3);
    assert_eq!(report.operations, 58);
    assert_eq!(progress.calls, vec![25, 50, 58]);

    let sim = dispatcher.into_controller();
    let enqueued: Vec<SimCommand> = sim
        .events()
        .iter()
        .filter_map(|e| match e {
            SimEvent::Enqueue { command, .. } => Some(command.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(enqueued.len(), queue.len());
    assert_eq!(sim.executed(), enqueued.as_slice());

    let sizes: Vec<usize> = batches_from_events(sim.events())
        .iter()
        .map(|b| b.iter().filter(|e| matches!(e, SimEvent::Enqueue { .. })).count())
        .collect();
    assert_eq!(sizes, vec![25, 25, 8]);

    for (i, command) in enqueued[..57].iter().enumerate() {
        assert_eq!(
            *command,
            SimCommand::Move { x: i as f64, y: 0.0, z: 1.0, mode: MoveMode::Linear }
        );
    }
    assert_eq!(enqueued[57], SimCommand::Tool(ToolState::Off));
}

#[tokio::test(start_paused = true)]
async fn test_next_batch_waits_for_drain() {
    let queue = CommandQueue::from_ops(moves(11));
    let sim = SimController::new(5).with_drain_per_poll(1);
    let mut dispatcher = Dispatcher::new(sim, settings(4, 5)).unwrap();
    assert_ok!(dispatcher.execute(queue.ops()).await);

    let sim = dispatcher.controller();
    // Never more than one batch in the controller at once
    assert!(sim.high_water() <= 4);

    let batches = batches_from_events(sim.events());
    assert_eq!(batches.len(), 3);
    for batch in &batches {
        let to_index = batch
            .iter()
            .filter_map(|e| match e {
                SimEvent::Enqueue { index, .. } => Some(*index),
                _ => None,
            })
            .last()
            .unwrap();
        let queries: Vec<QueueIndex> = batch
            .iter()
            .filter_map(|e| match e {
                SimEvent::IndexQuery(index) => Some(*index),
                _ => None,
            })
            .collect();
        // Drain condition observed true before stop, clear, and the next enqueue
        assert_eq!(queries.last(), Some(&to_index));
        assert!(queries[..queries.len() - 1].iter().all(|q| *q < to_index));

        let tail: Vec<&SimEvent> = batch
            .iter()
            .skip_while(|e| !matches!(e, SimEvent::Start))
            .collect();
        assert!(matches!(tail.first(), Some(SimEvent::Start)));
        assert_eq!(tail[tail.len() - 2], &SimEvent::Stop);
        assert_eq!(tail[tail.len() - 1], &SimEvent::Clear);
    }

    // Final clear after the last batch
    let events = sim.events();
    assert_eq!(&events[events.len() - 2..], &[SimEvent::Clear, SimEvent::Clear]);
}

#[tokio::test(start_paused = true)]
async fn test_polls_at_fixed_interval() {
    let queue = CommandQueue::from_ops(moves(3));
    let sim = SimController::new(8).with_drain_per_poll(1);
    let mut dispatcher = Dispatcher::new(sim, settings(4, 8)).unwrap();

    let start = tokio::time::Instant::now();
    dispatcher.execute(queue.ops()).await.unwrap();

    // Four commands drain one per poll: three sleeps between four polls
    assert!(start.elapsed() >= Duration::from_millis(600));
    assert!(start.elapsed() < Duration::from_millis(800));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_controller_times_out() {
    let queue = CommandQueue::from_ops(moves(2));
    let sim = SimController::new(8).with_drain_per_poll(0);
    let mut dispatcher = Dispatcher::new(
        sim,
        DispatchSettings {
            drain_timeout: Duration::from_secs(2),
            ..settings(4, 8)
        },
    )
    .unwrap();

    let err = dispatcher.execute(queue.ops()).await.unwrap_err();
    match err {
        DispatchError::DrainTimeout { to_index, last_seen, waited } => {
            assert_eq!(to_index, QueueIndex(3));
            assert_eq!(last_seen, QueueIndex(0));
            assert!(waited >= Duration::from_secs(2));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Execution is stopped on the way out
    assert_eq!(dispatcher.controller().events().last(), Some(&SimEvent::Stop));
}

#[tokio::test(start_paused = true)]
async fn test_controller_failure_propagates_without_retry() {
    let queue = CommandQueue::from_ops(moves(9));
    let sim = SimController::new(8).with_failure_at_enqueue(5);
    let mut dispatcher = Dispatcher::new(sim, settings(4, 8)).unwrap();

    let err = dispatcher.execute(queue.ops()).await.unwrap_err();
    assert!(matches!(err, DispatchError::Controller(ControllerError::Disconnected)));
    // The first batch completed, the second failed on its second operation
    assert_eq!(dispatcher.controller().executed().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_every_operation_kind_reaches_controller() {
    let ops = vec![
        Operation::Home,
        Operation::SetFeedrate { units_per_min: 1500.0 },
        Operation::SetDigitalOutput { port: 17, level: true },
        Operation::Wait { duration_ms: 300 },
        Operation::ToolOn,
        Operation::Move { x: 1.0, y: 2.0, z: 3.0 },
        Operation::ToolOff,
        Operation::ToolDisable,
    ];
    let sim = SimController::new(8).with_drain_per_poll(8);
    let mut dispatcher = Dispatcher::new(
        sim,
        DispatchSettings {
            move_mode: MoveMode::Jump,
            ..settings(7, 8)
        },
    )
    .unwrap();
    dispatcher.execute(&ops).await.unwrap();

    assert_eq!(
        dispatcher.controller().executed(),
        &[
            SimCommand::Home,
            SimCommand::Feedrate(1500.0),
            SimCommand::DigitalOutput { port: 17, level: true },
            SimCommand::Wait(300),
            SimCommand::Tool(ToolState::On),
            SimCommand::Move { x: 1.0, y: 2.0, z: 3.0, mode: MoveMode::Jump },
            SimCommand::Tool(ToolState::Off),
            SimCommand::Tool(ToolState::Off),
        ]
    );
}
