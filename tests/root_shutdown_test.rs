//! Killing the root process tears down every other live process, linked or
//! not. Isolated in its own test binary (cargo gives every `tests/*.rs` file
//! its own process) since it terminates the process-wide runtime singleton
//! for the whole binary.

use std::sync::mpsc::{channel, Sender};
use std::time::Duration;

use linkproc::{spawn, HandlerOutcome, Matcher, Pattern, Runtime};

fn spawn_exit_logger(name: &'static str, tx: Sender<String>) -> linkproc::Handle {
    spawn(name, move |handle| {
        let own_name = handle.name().to_string();
        linkproc::install_receiver(
            &handle,
            Pattern::new(vec![Matcher::from("EXIT")]),
            Box::new(move |_| {
                tx.send(format!("(EXIT, {own_name})")).unwrap();
                HandlerOutcome::Continue
            }),
        )
        .unwrap();
    })
}

#[test]
fn killing_root_kills_all_processes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = Runtime::bootstrap();
    let (tx, rx) = channel::<String>();

    let one = spawn_exit_logger("one", tx.clone());
    let two = spawn_exit_logger("two", tx.clone());

    linkproc::terminate(&runtime.root_handle());
    linkproc::wait(&one, Some(Duration::from_secs(2)));
    linkproc::wait(&two, Some(Duration::from_secs(2)));

    assert!(!linkproc::is_alive(&one));
    assert!(!linkproc::is_alive(&two));

    let mut events = Vec::new();
    while let Ok(event) = rx.recv_timeout(Duration::from_millis(300)) {
        events.push(event);
    }
    events.sort();
    assert_eq!(events, vec!["(EXIT, one)".to_string(), "(EXIT, two)".to_string()]);
}
