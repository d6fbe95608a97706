mod common;

use std::time::Duration;

use common::*;
use guildpost_core::*;
use tokio::sync::mpsc;

async fn subscribe(h: &Harness, guild: u64, channel: ChannelRef) {
    let id = channel.id;
    h.gateway.add_channel(guild, channel);
    h.store.add_broadcast_channel(id).await.unwrap();
}

#[tokio::test]
async fn online_broadcast_skips_bad_channels_and_keeps_going() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;
    // deleted channel
    h.store.add_broadcast_channel(2).await.unwrap();
    subscribe(&h, GUILD, ChannelRef::new(3, "voice", ChannelKind::Voice)).await;
    subscribe(&h, GUILD, ChannelRef::new(4, "locked", ChannelKind::Text)).await;
    h.gateway.deny_send(4);
    subscribe(&h, GUILD, ChannelRef::new(5, "flaky", ChannelKind::Text)).await;
    h.gateway.break_channel(5);
    subscribe(&h, OTHER_GUILD, ChannelRef::new(6, "news", ChannelKind::Announcement)).await;

    let delivered = h.notifier.announce_online().await;

    let online = StatusConfig::default().online;
    assert_eq!(delivered, 2);
    assert_eq!(h.gateway.sent(), vec![(1, online.clone()), (6, online)]);
    assert_eq!(h.notifier.phase(), LifecyclePhase::Running);
    assert!(h.exit.codes().is_empty());
}

#[tokio::test]
async fn online_broadcast_runs_once() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;

    assert_eq!(h.notifier.announce_online().await, 1);
    assert_eq!(h.notifier.announce_online().await, 0);
    assert_eq!(h.gateway.sent().len(), 1);
}

#[tokio::test]
async fn offline_then_exit_in_order() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;
    h.notifier.announce_online().await;

    h.notifier.announce_offline_and_exit(EXIT_OK).await;

    let calls = h.gateway.calls();
    let offline = Call::Send(1, StatusConfig::default().offline);
    let offline_at = calls.iter().position(|c| *c == offline).unwrap();
    let disconnect_at = calls.iter().position(|c| *c == Call::Disconnect).unwrap();
    assert!(offline_at < disconnect_at);
    assert_eq!(disconnect_at, calls.len() - 1);
    assert_eq!(h.exit.codes(), vec![EXIT_OK]);
    assert_eq!(h.notifier.phase(), LifecyclePhase::Exited);
}

#[tokio::test]
async fn repeated_triggers_collapse_into_first() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;
    subscribe(&h, GUILD, ChannelRef::new(2, "log", ChannelKind::Text)).await;

    tokio::join!(
        h.notifier.announce_offline_and_exit(EXIT_FAULT),
        h.notifier.announce_offline_and_exit(EXIT_OK),
        h.notifier.shutdown(ShutdownTrigger::Restart),
    );
    h.notifier.shutdown(ShutdownTrigger::Terminate).await;

    assert_eq!(h.exit.codes(), vec![EXIT_FAULT]);
    assert_eq!(h.gateway.sent().len(), 2);
    assert_eq!(h.gateway.disconnects(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_on_worker_threads_exit_once() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;
    let notifier = h.notifier.clone();

    let mut handles = Vec::new();
    for code in 0..8 {
        let notifier = notifier.clone();
        handles.push(tokio::spawn(async move {
            notifier.announce_offline_and_exit(code).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.exit.codes().len(), 1);
    assert_eq!(h.gateway.sent().len(), 1);
    assert_eq!(h.gateway.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn signal_during_slow_offline_broadcast_waits_for_first_exit() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;
    h.gateway.slow_down(Duration::from_secs(5));

    let notifier = h.notifier.clone();
    let restart = tokio::spawn(async move { notifier.shutdown(ShutdownTrigger::Restart).await });
    while !h.notifier.shutdown_initiated() {
        tokio::task::yield_now().await;
    }

    h.notifier.shutdown(ShutdownTrigger::Interrupt).await;

    // The second trigger only returns once the first one has exited.
    assert_eq!(h.exit.codes(), vec![EXIT_RESTART]);
    assert_eq!(h.gateway.sent(), vec![(1, StatusConfig::default().offline)]);
    assert_eq!(h.notifier.phase(), LifecyclePhase::Exited);
    restart.await.unwrap();
    assert_eq!(h.exit.codes(), vec![EXIT_RESTART]);
}

#[tokio::test(start_paused = true)]
async fn client_ending_on_restart_disconnect_keeps_restart_code() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;
    h.gateway.slow_down(Duration::from_secs(1));
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    h.gateway.on_disconnect(ended_tx);

    // Stands in for the supervisor reacting to the client task finishing.
    let notifier = h.notifier.clone();
    let exit = h.exit.clone();
    let supervisor = tokio::spawn(async move {
        ended_rx.recv().await;
        notifier.shutdown(ShutdownTrigger::Terminate).await;
        exit.codes()
    });

    h.notifier.shutdown(ShutdownTrigger::Restart).await;

    let seen_by_supervisor = supervisor.await.unwrap();
    assert_eq!(seen_by_supervisor, vec![EXIT_RESTART]);
    assert_eq!(h.exit.codes(), vec![EXIT_RESTART]);
    assert_eq!(h.gateway.disconnects(), 1);
}

#[tokio::test]
async fn shutdown_uses_trigger_exit_code() {
    for (trigger, code) in [
        (ShutdownTrigger::Interrupt, EXIT_OK),
        (ShutdownTrigger::Terminate, EXIT_OK),
        (ShutdownTrigger::Fault("panicked at src/main.rs".into()), EXIT_FAULT),
        (ShutdownTrigger::Rejection("gateway closed".into()), EXIT_FAULT),
        (ShutdownTrigger::Restart, EXIT_RESTART),
    ] {
        let h = Harness::new();
        h.notifier.shutdown(trigger).await;
        assert_eq!(h.exit.codes(), vec![code]);
    }
}

#[tokio::test]
async fn empty_subscription_set_still_exits() {
    let h = Harness::new();
    h.notifier.announce_offline_and_exit(EXIT_OK).await;
    assert!(h.gateway.sent().is_empty());
    assert_eq!(h.gateway.disconnects(), 1);
    assert_eq!(h.exit.codes(), vec![EXIT_OK]);
}

#[tokio::test]
async fn online_announcement_after_shutdown_is_skipped() {
    let h = Harness::new();
    subscribe(&h, GUILD, ChannelRef::new(1, "status", ChannelKind::Text)).await;

    h.notifier.announce_offline_and_exit(EXIT_OK).await;
    assert!(h.notifier.shutdown_initiated());
    assert_eq!(h.notifier.announce_online().await, 0);
    assert_eq!(h.gateway.sent(), vec![(1, StatusConfig::default().offline)]);
}

#[tokio::test]
async fn publish_registers_every_command() {
    let h = Harness::new();
    publish(h.gateway.as_ref()).await.unwrap();
    assert_eq!(
        h.gateway.calls(),
        vec![Call::RegisterCommands(vec![
            "create-tagged-post",
            "set-content-channel",
            "subscribe-broadcast",
            "restart",
            "unsubscribe-broadcast",
        ])]
    );
}

#[tokio::test]
async fn publish_failure_is_returned_not_fatal() {
    let h = Harness::new();
    h.gateway.fail_registration();
    assert!(publish(h.gateway.as_ref()).await.is_err());
    assert!(h.exit.codes().is_empty());
}
