mod common;

use std::sync::{Arc, Mutex};

use common::{complete_all, init_logging, Journal, Scripted};
use courier_core::{
    CommandOutcome, CommandQueue, Dispatcher, FinishPolicy, Priority, PushOutcome, QueuedCommand,
};

fn queued(id: u64, scripted: Scripted) -> QueuedCommand {
    QueuedCommand::new(id, scripted.boxed())
}

#[test]
fn priority_bands_dispatch_high_then_normal_then_low() {
    init_logging();
    let journal = Journal::default();
    let mut dispatcher = Dispatcher::new(FinishPolicy::OnlyWhenHealthy);

    dispatcher.push(Scripted::new("low-1", &journal).with_priority(Priority::Low).boxed(), false);
    dispatcher.push(Scripted::new("normal-1", &journal).boxed(), false);
    dispatcher.push(Scripted::new("high", &journal).with_priority(Priority::High).boxed(), false);
    dispatcher.push(Scripted::new("normal-2", &journal).boxed(), false);
    dispatcher.push(Scripted::new("low-2", &journal).with_priority(Priority::Low).boxed(), false);

    assert_eq!(
        complete_all(&mut dispatcher),
        vec!["high", "normal-1", "normal-2", "low-1", "low-2"]
    );
}

#[test]
fn forced_command_dispatches_next() {
    init_logging();
    let journal = Journal::default();
    let mut dispatcher = Dispatcher::default();

    dispatcher.push(Scripted::new("a", &journal).boxed(), false);
    dispatcher.push(Scripted::new("b", &journal).with_priority(Priority::High).boxed(), false);
    dispatcher.push(Scripted::new("c", &journal).with_priority(Priority::Low).boxed(), false);
    dispatcher.push(Scripted::new("forced", &journal).with_priority(Priority::Low).boxed(), true);

    let order = complete_all(&mut dispatcher);
    assert_eq!(order.first().map(String::as_str), Some("forced"));
    assert_eq!(order, vec!["forced", "b", "a", "c"]);
}

#[test]
fn most_recent_force_insert_runs_first() {
    init_logging();
    let journal = Journal::default();
    let mut dispatcher = Dispatcher::default();

    dispatcher.push(Scripted::new("first-forced", &journal).boxed(), true);
    dispatcher.push(Scripted::new("second-forced", &journal).boxed(), true);

    assert_eq!(
        complete_all(&mut dispatcher),
        vec!["second-forced", "first-forced"]
    );
}

#[test]
fn unique_kind_is_queued_once() {
    init_logging();
    let journal = Journal::default();
    let mut dispatcher = Dispatcher::default();

    let first = dispatcher.push(
        Scripted::new("fee-1", &journal).of_kind("fee").as_unique().boxed(),
        false,
    );
    let second = dispatcher.push(
        Scripted::new("fee-2", &journal).of_kind("fee").as_unique().boxed(),
        false,
    );

    assert!(first.is_some());
    assert_eq!(second, None);
    assert_eq!(dispatcher.queue().len(), 1);
    assert_eq!(complete_all(&mut dispatcher), vec!["fee-1"]);
}

#[test]
fn uniqueness_ignores_the_command_in_flight() {
    init_logging();
    let journal = Journal::default();
    let mut dispatcher = Dispatcher::default();

    let (_, effects) = dispatcher.submit(
        Scripted::new("version-1", &journal)
            .of_kind("version")
            .as_unique()
            .boxed(),
        false,
    );
    assert_eq!(effects.len(), 1);
    assert!(dispatcher.is_busy());

    let again = dispatcher.push(
        Scripted::new("version-2", &journal)
            .of_kind("version")
            .as_unique()
            .boxed(),
        false,
    );
    assert!(again.is_some());
    assert_eq!(dispatcher.queue().len(), 1);
}

#[test]
fn normal_goes_ahead_of_an_all_low_queue() {
    let journal = Journal::default();
    let mut queue = CommandQueue::new();

    assert_eq!(
        queue.push(queued(1, Scripted::new("low-1", &journal).with_priority(Priority::Low)), false),
        PushOutcome::Queued { position: 0 }
    );
    assert_eq!(
        queue.push(queued(2, Scripted::new("low-2", &journal).with_priority(Priority::Low)), false),
        PushOutcome::Queued { position: 1 }
    );
    assert_eq!(
        queue.push(queued(3, Scripted::new("normal", &journal)), false),
        PushOutcome::Queued { position: 0 }
    );
    assert_eq!(
        queue.push(queued(4, Scripted::new("normal-2", &journal)), false),
        PushOutcome::Queued { position: 1 }
    );
    assert_eq!(queue.ids(), vec![3, 4, 1, 2]);
}

#[test]
fn normal_into_empty_queue_appends() {
    let journal = Journal::default();
    let mut queue = CommandQueue::new();

    assert_eq!(
        queue.push(queued(1, Scripted::new("only", &journal)), false),
        PushOutcome::Queued { position: 0 }
    );
    assert_eq!(queue.len(), 1);
}

#[test]
fn skipped_heads_are_discarded_with_outcome() {
    let journal = Journal::default();
    let outcomes: Arc<Mutex<Vec<(u64, CommandOutcome)>>> = Arc::default();
    let mut queue = CommandQueue::new();

    let sink = outcomes.clone();
    queue.push(
        queued(1, Scripted::new("gone", &journal).skipped()).with_callback(Box::new(
            move |id: u64, outcome: &CommandOutcome| sink.lock().unwrap().push((id, outcome.clone())),
        )),
        false,
    );
    queue.push(queued(2, Scripted::new("gone-too", &journal).skipped()), false);
    queue.push(queued(3, Scripted::new("kept", &journal)), false);

    let next = queue.pop_next().expect("a runnable command");
    assert_eq!(next.id(), 3);
    assert!(queue.is_empty());
    assert_eq!(
        outcomes.lock().unwrap().as_slice(),
        &[(1, CommandOutcome::Skipped)]
    );
}

#[test]
fn queue_of_only_skipped_commands_drains_to_nothing() {
    let journal = Journal::default();
    let mut queue = CommandQueue::new();
    queue.push(queued(1, Scripted::new("a", &journal).skipped()), false);
    queue.push(queued(2, Scripted::new("b", &journal).skipped()), false);

    assert!(queue.pop_next().is_none());
    assert!(queue.is_empty());
}

#[test]
fn history_fee_and_forced_version_dispatch_in_expected_order() {
    init_logging();
    let journal = Journal::default();
    let mut dispatcher = Dispatcher::default();

    dispatcher.push(Scripted::new("history", &journal).boxed(), false);
    dispatcher.push(
        Scripted::new("fee", &journal)
            .with_priority(Priority::Low)
            .as_unique()
            .boxed(),
        false,
    );
    dispatcher.push(
        Scripted::new("version", &journal)
            .with_priority(Priority::High)
            .boxed(),
        true,
    );

    assert_eq!(
        complete_all(&mut dispatcher),
        vec!["version", "history", "fee"]
    );
}
