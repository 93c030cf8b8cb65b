//! Integration tests for the channel mode engine

use oxircd_core::modes::ModeChange;
use oxircd_core::*;
use std::sync::Arc;
use tokio::sync::mpsc;

fn local_user(pool: &Database, uid: &str, nick: &str) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    let user = User::new(
        uid.to_string(),
        nick.to_string(),
        "u".to_string(),
        format!("{} test", nick),
        "host.example.org".to_string(),
        "irc.example.org".to_string(),
        "0AA".to_string(),
    )
    .with_sender(tx);
    pool.add_user(user).unwrap();
    rx
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message.to_line().trim_end().to_string());
    }
    out
}

fn engine() -> ModeEngine {
    ModeEngine::new("irc.example.org", "0AA")
}

const ALICE: &str = "0AAAAAAAA";
const BOB: &str = "0AAAAAAAB";

fn channel_with_op(op_uid: &str) -> Channel {
    let mut channel = Channel::new("#a".to_string());
    channel.add(op_uid);
    channel.add_to_list("op", op_uid, "irc.example.org");
    channel
}

#[test]
fn test_op_sets_simple_modes() {
    let pool = Database::new();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    let engine = engine();
    let mut channel = channel_with_op(ALICE);

    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(ALICE.to_string()),
        "+mnt",
        false,
        false,
    );
    assert_eq!(applied.len(), 3);
    assert!(channel.is_mode("moderated"));
    assert!(channel.is_mode("no_ext"));
    assert!(channel.is_mode("protect_topic"));
    assert!(drain(&mut alice_rx).is_empty());
}

#[test]
fn test_statusless_member_denied() {
    let pool = Database::new();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    let engine = engine();
    let mut channel = channel_with_op(ALICE);
    channel.add(BOB);

    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(BOB.to_string()),
        "+m",
        false,
        false,
    );
    assert!(applied.is_empty());
    assert!(!channel.is_mode("moderated"));

    let lines = drain(&mut bob_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 482 bob #a "), "got {:?}", lines);
}

#[test]
fn test_server_source_needs_no_status() {
    let pool = Database::new();
    let engine = engine();
    let mut channel = Channel::new("#a".to_string());

    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::Server("hub.example.org".to_string()),
        "+mi",
        false,
        true,
    );
    assert_eq!(applied.len(), 2);
    assert!(channel.is_mode("invite_only"));
}

#[test]
fn test_status_grant_normalizes_to_uid() {
    let pool = Database::new();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let _bob_rx = local_user(&pool, BOB, "bob");
    let engine = engine();
    let mut channel = channel_with_op(ALICE);
    channel.add(BOB);

    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(ALICE.to_string()),
        "+v bob",
        false,
        false,
    );
    assert_eq!(
        applied,
        vec![ModeChange::new(true, "voice", Some(BOB.to_string()))]
    );
    assert!(channel.user_is(BOB, "voice"));
}

#[test]
fn test_status_level_discipline() {
    let pool = Database::new();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    let engine = engine();

    // bob is a halfop, alice an op
    let mut channel = channel_with_op(ALICE);
    channel.add(BOB);
    channel.add_to_list("halfop", BOB, "irc.example.org");

    // a halfop cannot deop someone above them
    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(BOB.to_string()),
        "-o alice",
        false,
        false,
    );
    assert!(applied.is_empty());
    assert!(channel.user_is(ALICE, "op"));
    let lines = drain(&mut bob_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 482 "));

    // nor grant a status above their own level
    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(BOB.to_string()),
        "+q bob",
        false,
        false,
    );
    assert!(applied.is_empty());
    assert!(!channel.user_is(BOB, "owner"));

    // but force overrides everything
    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(BOB.to_string()),
        "-o alice",
        true,
        false,
    );
    assert_eq!(applied.len(), 1);
    assert!(!channel.user_is(ALICE, "op"));
}

#[test]
fn test_status_target_errors() {
    let pool = Database::new();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    let engine = engine();
    let mut channel = channel_with_op(ALICE);

    // no such nick
    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(ALICE.to_string()),
        "+v ghost",
        false,
        false,
    );
    assert!(applied.is_empty());
    let lines = drain(&mut alice_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 401 alice ghost "));

    // not on channel
    let _bob_rx = local_user(&pool, BOB, "bob");
    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &ModeSource::User(ALICE.to_string()),
        "+v bob",
        false,
        false,
    );
    assert!(applied.is_empty());
    let lines = drain(&mut alice_rx);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" 441 alice bob #a "));
}

#[test]
fn test_ban_add_remove_and_duplicates() {
    let pool = Database::new();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let engine = engine();
    let mut channel = channel_with_op(ALICE);
    let source = ModeSource::User(ALICE.to_string());

    let applied =
        engine.handle_mode_string(&pool, &mut channel, &source, "+b *!*@spam.example", false, false);
    assert_eq!(applied.len(), 1);
    assert!(channel.list_has("ban", "*!*@spam.example"));
    assert_eq!(channel.list_elements("ban")[0].setby, "alice");

    // duplicate entries are refused without unwinding the batch
    let applied = engine.handle_mode_string(
        &pool,
        &mut channel,
        &source,
        "+bm *!*@spam.example",
        false,
        false,
    );
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].name, "moderated");
    assert_eq!(channel.list_elements("ban").len(), 1);

    let applied =
        engine.handle_mode_string(&pool, &mut channel, &source, "-b *!*@spam.example", false, false);
    assert_eq!(applied.len(), 1);
    assert!(!channel.list_has("ban", "*!*@spam.example"));
}

#[test]
fn test_ban_view_path() {
    let pool = Database::new();
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    let engine = engine();
    let mut channel = channel_with_op(ALICE);
    channel.add_to_list("ban", "*!*@spam.example", "irc.example.org");

    let applied = engine.handle_modes(
        &pool,
        &mut channel,
        &ModeSource::User(ALICE.to_string()),
        vec![ModeChange::new(true, "ban", None)],
        false,
        false,
    );
    assert!(applied.is_empty());
    assert_eq!(channel.list_elements("ban").len(), 1);

    let lines = drain(&mut alice_rx);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(" 367 alice #a *!*@spam.example irc.example.org "));
    assert!(lines[1].contains(" 368 alice #a "));
}

#[test]
fn test_missing_mandatory_parameter_skips_only_that_mode() {
    let pool = Database::new();
    let engine = engine();
    let mut channel = Channel::new("#a".to_string());
    let source = ModeSource::Server("hub.example.org".to_string());

    let applied = engine.handle_modes(
        &pool,
        &mut channel,
        &source,
        vec![
            ModeChange::new(true, "limit", None),
            ModeChange::new(true, "moderated", None),
        ],
        false,
        true,
    );
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].name, "moderated");
    assert!(!channel.is_mode("limit"));
}

#[test]
fn test_limit_rejects_garbage() {
    let pool = Database::new();
    let _alice_rx = local_user(&pool, ALICE, "alice");
    let engine = engine();
    let mut channel = channel_with_op(ALICE);
    let source = ModeSource::User(ALICE.to_string());

    let applied =
        engine.handle_mode_string(&pool, &mut channel, &source, "+l many", false, false);
    assert!(applied.is_empty());
    assert!(!channel.is_mode("limit"));

    let applied = engine.handle_mode_string(&pool, &mut channel, &source, "+l 25", false, false);
    assert_eq!(applied.len(), 1);
    assert_eq!(channel.mode_parameter("limit"), Some("25"));
}

#[test]
fn test_unknown_mode_skipped() {
    let pool = Database::new();
    let engine = engine();
    let mut channel = Channel::new("#a".to_string());
    let applied = engine.handle_modes(
        &pool,
        &mut channel,
        &ModeSource::Server("hub.example.org".to_string()),
        vec![ModeChange::new(true, "sparkle", None)],
        true,
        true,
    );
    assert!(applied.is_empty());
}

#[tokio::test]
async fn test_do_modes_fans_out_and_serializes() {
    let pool = Arc::new(Database::new());
    let mut alice_rx = local_user(&pool, ALICE, "alice");
    let mut bob_rx = local_user(&pool, BOB, "bob");
    let (links, _events) = ServerConnectionManager::new(Arc::new(Config::default()), Arc::clone(&pool));

    let engine = engine();
    let mut channel = channel_with_op(ALICE);
    channel.add(BOB);

    let applied = engine.do_modes(
        &pool,
        &links,
        &mut channel,
        &ModeSource::User(ALICE.to_string()),
        engine.table.cmodes_from_string("+mv bob", false),
        false,
        false,
        false,
    );
    assert_eq!(applied.len(), 2);

    let expected = ":alice!u@host.example.org MODE #a +mv bob";
    assert_eq!(drain(&mut alice_rx), vec![expected.to_string()]);
    assert_eq!(drain(&mut bob_rx), vec![expected.to_string()]);
}
