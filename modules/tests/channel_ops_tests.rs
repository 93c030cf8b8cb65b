//! Integration tests for channel operations

use oxircd_core::*;
use oxircd_modules::ChannelModule;
use std::sync::Arc;
use tokio::sync::mpsc;

const ALICE: &str = "0AAAAAAAA";
const BOB: &str = "0AAAAAAAB";
const CAROL: &str = "0AAAAAAAC";

fn local_user_with_caps(
    pool: &Database,
    uid: &str,
    nick: &str,
    caps: &[&str],
) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut user = User::new(
        uid.to_string(),
        nick.to_string(),
        "u".to_string(),
        format!("{} test", nick),
        "host.example.org".to_string(),
        "irc.example.org".to_string(),
        "0AA".to_string(),
    )
    .with_sender(tx);
    for cap in caps {
        user.caps.insert(cap.to_string());
    }
    pool.add_user(user).unwrap();
    rx
}

fn local_user(pool: &Database, uid: &str, nick: &str) -> mpsc::UnboundedReceiver<Message> {
    local_user_with_caps(pool, uid, nick, &[])
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message.to_line().trim_end().to_string());
    }
    out
}

fn attach_events(pool: &Database, uid: &str) -> EventReceiver {
    let (tx, rx) = event_channel();
    let user = pool.lookup_user(uid).unwrap().with_events(tx);
    pool.update_user(user).unwrap();
    rx
}

fn setup() -> (Arc<Database>, Arc<ServerConnectionManager>, ChannelModule) {
    let pool = Arc::new(Database::new());
    let (links, _events) =
        ServerConnectionManager::new(Arc::new(Config::default()), Arc::clone(&pool));
    let module = ChannelModule::new(
        "irc.example.org",
        "0AA",
        Some("+ntqo +user +user".to_string()),
    );
    (pool, links, module)
}

fn seed_channel(pool: &Database, name: &str, members: &[(&str, Option<&str>)]) {
    let mut channel = Channel::new(name.to_string());
    for (uid, status) in members {
        channel.add(uid);
        if let Some(status) = status {
            channel.add_to_list(status, uid, "irc.example.org");
        }
    }
    pool.add_channel(channel).unwrap();
}

#[tokio::test]
async fn test_op_kicks_voiced_user() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    seed_channel(&pool, "#a", &[(ALICE, Some("op")), (BOB, Some("voice"))]);

    let message = Message::parse("KICK #a bob :bye bye").unwrap();
    module.handle_message(&pool, &links, ALICE, &message).unwrap();

    let expected = ":alice!u@host.example.org KICK #a bob :bye bye";
    assert_eq!(drain(&mut alice_rx), vec![expected.to_string()]);
    assert_eq!(drain(&mut bob_rx), vec![expected.to_string()]);

    let channel = pool.get_channel("#a").unwrap();
    assert!(!channel.has_user(BOB));
    assert!(!channel.user_is(BOB, "voice"));
    assert!(channel.has_user(ALICE));
}

#[tokio::test]
async fn test_kick_requires_rank() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    seed_channel(&pool, "#a", &[(ALICE, Some("op")), (BOB, Some("voice"))]);

    let message = Message::parse("KICK #a alice :revenge").unwrap();
    module.handle_message(&pool, &links, BOB, &message).unwrap();

    let lines = drain(&mut bob_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 482 bob #a "));
    assert!(pool.get_channel("#a").unwrap().has_user(ALICE));
}

#[tokio::test]
async fn test_ban_view_has_no_side_effects() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#a", &[(ALICE, Some("op"))]);

    let set = Message::parse("MODE #a +b *!*@spam.example").unwrap();
    module.handle_message(&pool, &links, ALICE, &set).unwrap();
    drain(&mut alice_rx);

    let view = Message::parse("MODE #a b").unwrap();
    module.handle_message(&pool, &links, ALICE, &view).unwrap();

    let lines = drain(&mut alice_rx);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(" 367 alice #a *!*@spam.example alice "));
    assert!(lines[1].contains(" 368 alice #a "));
    assert_eq!(
        pool.get_channel("#a").unwrap().list_elements("ban").len(),
        1
    );
}

#[tokio::test]
async fn test_mode_query() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#a", &[(ALICE, Some("op"))]);

    let set = Message::parse("MODE #a +ntk hunter2").unwrap();
    module.handle_message(&pool, &links, ALICE, &set).unwrap();
    drain(&mut alice_rx);

    let query = Message::parse("MODE #a").unwrap();
    module.handle_message(&pool, &links, ALICE, &query).unwrap();

    let lines = drain(&mut alice_rx);
    assert_eq!(lines.len(), 2);
    // members see the key in the reply
    assert!(lines[0].contains(" 324 alice #a +knt hunter2"));
    assert!(lines[1].contains(" 329 alice #a "));
}

#[tokio::test]
async fn test_ts_reconciliation_clears_modes() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#a", &[(ALICE, None)]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.set_time(1000);
    channel.set_mode("moderated", None);
    channel.set_mode("no_ext", None);
    channel.set_mode("protect_topic", None);
    pool.update_channel(channel.clone());

    // a peer asserts an older channel
    let new_time = module.take_lower_time(&pool, &links, &mut channel, 500, false);
    pool.update_channel(channel.clone());

    assert_eq!(new_time, 500);
    assert_eq!(channel.time, 500);
    assert!(!channel.is_mode("moderated"));
    assert!(!channel.is_mode("no_ext"));
    assert!(!channel.is_mode("protect_topic"));

    let lines = drain(&mut alice_rx);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], ":irc.example.org MODE #a -mnt");
    assert!(lines[1].contains("New channel time"));
    assert!(lines[1].contains("500"));
}

#[tokio::test]
async fn test_take_lower_time_is_idempotent_for_higher_times() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#a", &[(ALICE, None)]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.set_time(500);
    channel.set_mode("moderated", None);

    assert_eq!(module.take_lower_time(&pool, &links, &mut channel, 1000, false), 500);
    assert_eq!(channel.time, 500);
    assert!(channel.is_mode("moderated"));
}

#[tokio::test]
async fn test_join_new_channel_applies_automodes() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");

    module
        .attempt_local_join(&pool, &links, "#fresh", ALICE, None)
        .unwrap();

    let channel = pool.get_channel("#fresh").unwrap();
    assert!(channel.has_user(ALICE));
    assert!(channel.is_mode("no_ext"));
    assert!(channel.is_mode("protect_topic"));
    assert!(channel.user_is(ALICE, "owner"));
    assert!(channel.user_is(ALICE, "op"));

    let lines = drain(&mut alice_rx);
    assert_eq!(lines[0], ":alice!u@host.example.org JOIN #fresh");
    // no topic is set, so NAMES follows directly
    assert!(lines[1].contains(" 353 alice = #fresh ~alice"));
    assert!(lines[2].contains(" 366 alice #fresh "));
}

#[tokio::test]
async fn test_join_variants_and_away_notify() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx =
        local_user_with_caps(&pool, BOB, "bob", &["extended-join", "away-notify"]);

    module
        .attempt_local_join(&pool, &links, "#mixed", ALICE, None)
        .unwrap();
    module
        .attempt_local_join(&pool, &links, "#mixed", BOB, None)
        .unwrap();
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    // carol is away when she joins
    let mut carol = User::new(
        CAROL.to_string(),
        "carol".to_string(),
        "u".to_string(),
        "carol test".to_string(),
        "host.example.org".to_string(),
        "irc.example.org".to_string(),
        "0AA".to_string(),
    );
    let (tx, _carol_rx) = mpsc::unbounded_channel();
    carol = carol.with_sender(tx);
    carol.away_message = Some("brb".to_string());
    pool.add_user(carol).unwrap();

    module
        .attempt_local_join(&pool, &links, "#mixed", CAROL, None)
        .unwrap();

    let alice_lines = drain(&mut alice_rx);
    assert_eq!(alice_lines, vec![":carol!u@host.example.org JOIN #mixed".to_string()]);

    let bob_lines = drain(&mut bob_rx);
    assert_eq!(
        bob_lines,
        vec![
            ":carol!u@host.example.org JOIN #mixed * :carol test".to_string(),
            ":carol!u@host.example.org AWAY brb".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_banned_user_cannot_join() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    seed_channel(&pool, "#a", &[(ALICE, Some("op"))]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.add_to_list("ban", "bob!*@*", "alice");
    pool.update_channel(channel);

    module
        .attempt_local_join(&pool, &links, "#a", BOB, None)
        .unwrap();

    let lines = drain(&mut bob_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 474 bob #a "));
    assert!(!pool.get_channel("#a").unwrap().has_user(BOB));
}

#[tokio::test]
async fn test_stopped_join_fires_join_failed() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    let mut bob_events = attach_events(&pool, BOB);
    seed_channel(&pool, "#a", &[(ALICE, Some("op"))]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.add_to_list("ban", "bob!*@*", "alice");
    pool.update_channel(channel);

    module
        .attempt_local_join(&pool, &links, "#a", BOB, None)
        .unwrap();

    let event = bob_events.try_recv().unwrap();
    assert_eq!(event.name, "join_failed");
    assert_eq!(event.source, BOB);
    assert_eq!(event.payload, vec!["#a".to_string()]);
    assert!(drain(&mut bob_rx)[0].contains(" 474 bob #a "));
}

#[tokio::test]
async fn test_message_event_and_command_gate() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    let mut alice_events = attach_events(&pool, ALICE);
    seed_channel(&pool, "#a", &[(ALICE, Some("op")), (BOB, None)]);

    let mut module = module;
    module
        .events
        .on_can_command("notice", Box::new(|_, _, _, _| false));

    // notices are gated off; no fan-out, no event
    let notice = Message::parse("NOTICE #a :psst").unwrap();
    module.handle_message(&pool, &links, ALICE, &notice).unwrap();
    assert!(drain(&mut bob_rx).is_empty());
    assert!(alice_events.try_recv().is_err());

    // privmsg still flows and fires its event after the fan-out
    let message = Message::parse("PRIVMSG #a :hello").unwrap();
    module.handle_message(&pool, &links, ALICE, &message).unwrap();
    assert_eq!(drain(&mut bob_rx).len(), 1);
    let event = alice_events.try_recv().unwrap();
    assert_eq!(event.name, "privmsg");
    assert_eq!(event.payload, vec!["#a".to_string(), "hello".to_string()]);
}

#[tokio::test]
async fn test_except_overrides_ban() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    seed_channel(&pool, "#a", &[(ALICE, Some("op"))]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.add_to_list("ban", "*!*@host.example.org", "alice");
    channel.add_to_list("except", "bob!*@*", "alice");
    pool.update_channel(channel);

    module
        .attempt_local_join(&pool, &links, "#a", BOB, None)
        .unwrap();

    assert!(pool.get_channel("#a").unwrap().has_user(BOB));
    let lines = drain(&mut bob_rx);
    assert!(lines[0].starts_with(":bob!u@host.example.org JOIN #a"));
}

#[tokio::test]
async fn test_wrong_key_rejected() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    seed_channel(&pool, "#a", &[(ALICE, Some("op"))]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.set_mode("key", Some("sekrit".to_string()));
    pool.update_channel(channel);

    module
        .attempt_local_join(&pool, &links, "#a", BOB, Some("wrong"))
        .unwrap();
    let lines = drain(&mut bob_rx);
    assert!(lines[0].contains(" 475 bob #a "));

    module
        .attempt_local_join(&pool, &links, "#a", BOB, Some("sekrit"))
        .unwrap();
    assert!(pool.get_channel("#a").unwrap().has_user(BOB));
}

#[tokio::test]
async fn test_privmsg_fanout_skips_source_and_deaf() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    let mut carol_rx = local_user(&pool, CAROL, "carol");

    let mut carol = pool.lookup_user(CAROL).unwrap();
    carol.add_mode('D');
    pool.update_user(carol).unwrap();

    seed_channel(
        &pool,
        "#a",
        &[(ALICE, Some("op")), (BOB, None), (CAROL, None)],
    );

    let message = Message::parse("PRIVMSG #a :hello there").unwrap();
    module.handle_message(&pool, &links, ALICE, &message).unwrap();

    assert!(drain(&mut alice_rx).is_empty());
    assert_eq!(
        drain(&mut bob_rx),
        vec![":alice!u@host.example.org PRIVMSG #a :hello there".to_string()]
    );
    assert!(drain(&mut carol_rx).is_empty());
}

#[tokio::test]
async fn test_moderated_channel_blocks_statusless() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    seed_channel(&pool, "#a", &[(ALICE, Some("op")), (BOB, None)]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.set_mode("moderated", None);
    pool.update_channel(channel);

    let message = Message::parse("PRIVMSG #a :quiet please").unwrap();
    module.handle_message(&pool, &links, BOB, &message).unwrap();

    let lines = drain(&mut bob_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 404 bob #a "));

    // voiced users speak through +m
    let mut channel = pool.get_channel("#a").unwrap();
    channel.add_to_list("voice", BOB, "alice");
    pool.update_channel(channel);
    module.handle_message(&pool, &links, BOB, &message).unwrap();
    assert!(drain(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn test_names_hides_invisible_from_outsiders() {
    let (pool, _links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let _bob_rx = local_user(&pool, BOB, "bob");
    let mut carol_rx = local_user(&pool, CAROL, "carol");

    let mut bob = pool.lookup_user(BOB).unwrap();
    bob.add_mode('i');
    pool.update_user(bob).unwrap();

    seed_channel(&pool, "#a", &[(ALICE, Some("op")), (BOB, None)]);

    let channel = pool.get_channel("#a").unwrap();
    let carol = pool.lookup_user(CAROL).unwrap();
    module.names(&pool, &channel, &carol, false);

    let lines = drain(&mut carol_rx);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(" 353 carol = #a @alice"));
    assert!(!lines[0].contains("bob"));
}

#[tokio::test]
async fn test_part_destroys_empty_channel() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#solo", &[(ALICE, Some("op"))]);

    let message = Message::parse("PART #solo :gone").unwrap();
    module.handle_message(&pool, &links, ALICE, &message).unwrap();

    let lines = drain(&mut alice_rx);
    assert_eq!(lines, vec![":alice!u@host.example.org PART #solo gone".to_string()]);
    assert!(pool.get_channel("#solo").is_none());
}

#[tokio::test]
async fn test_destroy_veto() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#keep", &[(ALICE, None)]);

    let mut module = module;
    module.events.on_can_destroy(Box::new(|_| false));

    let message = Message::parse("PART #keep").unwrap();
    module.handle_message(&pool, &links, ALICE, &message).unwrap();

    let channel = pool.get_channel("#keep").unwrap();
    assert!(channel.is_empty());
}

#[tokio::test]
async fn test_topic_set_and_ts_drop() {
    let (pool, links, module) = setup();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#a", &[(ALICE, Some("op"))]);

    let message = Message::parse("TOPIC #a :welcome home").unwrap();
    module.handle_message(&pool, &links, ALICE, &message).unwrap();
    let lines = drain(&mut alice_rx);
    assert_eq!(lines, vec![":alice!u@host.example.org TOPIC #a :welcome home".to_string()]);

    let mut channel = pool.get_channel("#a").unwrap();
    assert_eq!(channel.topic().unwrap().text, "welcome home");

    // losing TS reconciliation drops the topic with a clearing TOPIC
    let asserted = channel.time - 100;
    module.take_lower_time(&pool, &links, &mut channel, asserted, true);
    assert!(channel.topic().is_none());
    let lines = drain(&mut alice_rx);
    assert_eq!(lines[0], ":irc.example.org TOPIC #a :");
}

#[tokio::test]
async fn test_protected_topic_needs_status() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    seed_channel(&pool, "#a", &[(ALICE, Some("op")), (BOB, None)]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.set_mode("protect_topic", None);
    pool.update_channel(channel);

    let message = Message::parse("TOPIC #a :mine now").unwrap();
    module.handle_message(&pool, &links, BOB, &message).unwrap();

    let lines = drain(&mut bob_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 482 bob #a "));
    assert!(pool.get_channel("#a").unwrap().topic().is_none());
}

#[tokio::test]
async fn test_channel_burst_reconciles_inbound() {
    let (pool, links, module) = setup();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    seed_channel(&pool, "#a", &[(ALICE, None)]);

    let mut channel = pool.get_channel("#a").unwrap();
    channel.set_time(1000);
    channel.set_mode("moderated", None);
    pool.update_channel(channel);

    module
        .handle_channel_burst(&pool, &links, "#a", 500, "+nt")
        .unwrap();

    let channel = pool.get_channel("#a").unwrap();
    assert_eq!(channel.time, 500);
    assert!(!channel.is_mode("moderated"));
    assert!(channel.is_mode("no_ext"));
    assert!(channel.is_mode("protect_topic"));

    // an older local channel ignores a younger burst's modes
    module
        .handle_channel_burst(&pool, &links, "#a", 900, "+m")
        .unwrap();
    let channel = pool.get_channel("#a").unwrap();
    assert_eq!(channel.time, 500);
    assert!(!channel.is_mode("moderated"));
}
