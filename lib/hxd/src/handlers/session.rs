//! Login, the agreement round-trip, and keepalive.

use super::*;
use crate::error::{HandlerError, HandlerResult};
use crate::logging;
use crate::state::ServerState;
use hotline::access;
use hotline::obfuscate::obfuscate;
use hotline::transaction::Transaction;
use hotline::types::*;
use hotline::Field;
use hotline::SERVER_VERSION;
use std::time::Duration;

/// Clients older than 1.5 never send `TranAgreed`; they are joined straight
/// from login.
const AGREEMENT_MIN_VERSION: u16 = 123;

pub const ERR_BAD_LOGIN: &str = "Incorrect login.";

/// `TranLogin`: obfuscated credentials in, server identity out. A failed
/// login gets an error reply and a short-fuse disconnect.
pub fn handle_login(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let login_bytes = obfuscate(tx.field_bytes(FIELD_USER_LOGIN));
    let password = obfuscate(tx.field_bytes(FIELD_USER_PASSWORD));

    let login = if login_bytes.is_empty() {
        "guest".to_string()
    } else {
        String::from_utf8_lossy(&login_bytes).into_owned()
    };

    let account = state.accounts.lock().unwrap().get(&login);
    let account = match account {
        Some(account) if account.verify_password(&password) => account,
        _ => {
            logging::info!(state.log, "login rejected"; "login" => &login, "client_id" => origin);
            state.schedule_disconnect(origin, Duration::from_secs(1));
            return Err(HandlerError::new(ERR_BAD_LOGIN));
        }
    };

    let version = tx.field_int(FIELD_VERSION).unwrap_or(0) as u16;
    let wants_agreement = version >= AGREEMENT_MIN_VERSION
        && state.agreement.is_some()
        && !account.access.is_set(access::NO_AGREEMENT);

    let conn = state.conn(origin).ok_or_else(|| HandlerError::new(ERR_NOT_LOGGED_IN))?;
    {
        let mut guard = conn.lock().unwrap();
        guard.login = account.login.clone();
        guard.account_name = account.name.clone();
        guard.access = account.access;
        guard.version = version;
        guard.logged_in = true;

        let requested_name = tx.field_bytes(FIELD_USER_NAME);
        guard.user_name = if !requested_name.is_empty() && account.access.is_set(access::ANY_NAME) {
            requested_name.to_vec()
        } else {
            account.name.as_bytes().to_vec()
        };
        if let Some(icon) = tx.field_int(FIELD_USER_ICON_ID) {
            guard.icon = icon as u16;
        }
    }

    logging::info!(state.log, "login"; "login" => &account.login, "client_id" => origin, "version" => version);

    let mut out = vec![
        Outbound::reply(vec![
            Field::with_u16(FIELD_VERSION, SERVER_VERSION),
            Field::with_str(FIELD_SERVER_NAME, &state.config.server.name),
        ]),
        Outbound::Notify(
            origin,
            Transaction::new(
                TRAN_USER_ACCESS,
                vec![Field::new(FIELD_USER_ACCESS, account.access.bytes().to_vec())],
            ),
        ),
    ];

    if wants_agreement {
        let agreement = state.agreement.clone().expect("checked above");
        out.push(Outbound::Notify(
            origin,
            Transaction::new(TRAN_SHOW_AGREEMENT, vec![Field::new(FIELD_SERVER_AGREEMENT, agreement)]),
        ));
    } else if version >= AGREEMENT_MIN_VERSION {
        out.push(Outbound::Notify(
            origin,
            Transaction::new(
                TRAN_SHOW_AGREEMENT,
                vec![Field::with_u16(FIELD_NO_SERVER_AGREEMENT, 1)],
            ),
        ));
    } else {
        // Pre-1.5 client: no agreement round-trip, join it now.
        out.extend(join_client(state, origin));
    }

    Ok(out)
}

/// Mark the connection joined and announce it. Shared by `TranAgreed` and
/// the old-client login path.
fn join_client(state: &ServerState, origin: u16) -> Vec<Outbound> {
    let conn = match state.conn(origin) {
        Some(conn) => conn,
        None => return Vec::new(),
    };

    let snapshot = {
        let mut guard = conn.lock().unwrap();
        guard.joined = true;
        guard.clone()
    };

    let notify = notify_change_user(&snapshot);
    state
        .conn_list()
        .into_iter()
        .filter_map(|other| {
            let other = other.lock().unwrap();
            if other.id != origin && other.joined {
                Some(Outbound::Notify(other.id, notify.clone()))
            } else {
                None
            }
        })
        .collect()
}

/// `TranAgreed`: the client confirms the agreement was shown and supplies
/// its presence (nickname, icon, refusal options, auto-reply).
pub fn handle_agreed(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;

    let shared = state.conn(origin).ok_or_else(|| HandlerError::new(ERR_NOT_LOGGED_IN))?;
    {
        let mut guard = shared.lock().unwrap();

        let requested_name = tx.field_bytes(FIELD_USER_NAME);
        if !requested_name.is_empty() && conn.access.is_set(access::ANY_NAME) {
            guard.user_name = requested_name.to_vec();
        }
        if let Some(icon) = tx.field_int(FIELD_USER_ICON_ID) {
            guard.icon = icon as u16;
        }

        let options = tx.field_int(FIELD_OPTIONS).unwrap_or(0) as u16;
        let mut flags = guard.flags & !(USER_FLAG_REFUSE_PM | USER_FLAG_REFUSE_CHAT);
        if options & 0x0001 != 0 {
            flags |= USER_FLAG_REFUSE_PM;
        }
        if options & 0x0002 != 0 {
            flags |= USER_FLAG_REFUSE_CHAT;
        }
        guard.flags = flags;

        guard.auto_reply = tx.field_bytes(FIELD_AUTOMATIC_RESPONSE).to_vec();
    }

    let mut out = vec![Outbound::ok()];
    out.extend(join_client(state, origin));
    Ok(out)
}

/// `TranKeepAlive`: an empty reply, nothing else.
pub fn handle_keep_alive(_state: &ServerState, _origin: u16, _tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    Ok(vec![Outbound::ok()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::accounts::{hash_password, Account};
    use crate::state::testutil;
    use hotline::access::AccessBitmap;

    fn login_tx(login: &str, password: &str, version: u16) -> Transaction {
        Transaction::new(
            TRAN_LOGIN,
            vec![
                Field::new(FIELD_USER_LOGIN, obfuscate(login.as_bytes())),
                Field::new(FIELD_USER_PASSWORD, obfuscate(password.as_bytes())),
                Field::with_u16(FIELD_VERSION, version),
            ],
        )
    }

    fn raw_client(state: &ServerState) -> u16 {
        let conn = state
            .clients
            .lock()
            .unwrap()
            .add("127.0.0.1:6000".to_string(), state.config.paths.file_root.clone())
            .unwrap();
        let id = conn.lock().unwrap().id;
        id
    }

    #[test]
    fn test_login_success_reply() {
        let (_dir, state) = testutil::state();
        let id = raw_client(&state);

        let out = handle_login(&state, id, &login_tx("admin", "", 150)).unwrap();

        match &out[0] {
            Outbound::Reply(reply) => {
                assert_eq!(reply.field_int(FIELD_VERSION), Some(u32::from(hotline::SERVER_VERSION)));
                assert_eq!(reply.field_bytes(FIELD_SERVER_NAME), state.config.server.name.as_bytes());
            }
            other => panic!("expected reply, got {:?}", other),
        }

        // Access pushed alongside the reply.
        match &out[1] {
            Outbound::Notify(target, tx) => {
                assert_eq!(*target, id);
                assert_eq!(tx.ty, TRAN_USER_ACCESS);
                assert_eq!(tx.field_bytes(FIELD_USER_ACCESS), &[0xFF; 8]);
            }
            other => panic!("expected access notify, got {:?}", other),
        }

        assert!(state.conn_snapshot(id).unwrap().logged_in);
    }

    #[test]
    fn test_login_bad_password_schedules_disconnect() {
        let (_dir, state) = testutil::state();
        let id = raw_client(&state);
        state
            .accounts
            .lock()
            .unwrap()
            .create(Account {
                login: "alice".to_string(),
                name: "Alice".to_string(),
                password: hash_password(b"right"),
                access: AccessBitmap::default(),
            })
            .unwrap();

        let err = handle_login(&state, id, &login_tx("alice", "wrong", 150)).unwrap_err();

        assert_eq!(err.0, ERR_BAD_LOGIN);
        assert!(!state.conn_snapshot(id).unwrap().logged_in);
        assert_eq!(state.pending_disconnects.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_login_empty_login_falls_back_to_guest() {
        let (_dir, state) = testutil::state();
        let id = raw_client(&state);

        handle_login(&state, id, &login_tx("", "", 150)).unwrap();

        assert_eq!(state.conn_snapshot(id).unwrap().login, "guest");
    }

    #[test]
    fn test_login_old_client_joins_immediately() {
        let (_dir, state) = testutil::state();
        let watcher = testutil::join_client(&state, "Watcher");
        let id = raw_client(&state);

        let out = handle_login(&state, id, &login_tx("guest", "", 120)).unwrap();

        assert!(state.conn_snapshot(id).unwrap().joined);
        assert!(out.iter().any(|o| matches!(
            o,
            Outbound::Notify(target, tx) if *target == watcher && tx.ty == TRAN_NOTIFY_CHANGE_USER
        )));
    }

    #[test]
    fn test_login_nickname_requires_any_name() {
        let (_dir, state) = testutil::state();
        let id = raw_client(&state);

        let mut tx = login_tx("guest", "", 150);
        tx.fields.push(Field::new(FIELD_USER_NAME, b"Imposter".to_vec()));
        handle_login(&state, id, &tx).unwrap();

        // Guest lacks AnyName; the account display name wins.
        assert_eq!(state.conn_snapshot(id).unwrap().user_name, b"Guest".to_vec());
    }

    #[test]
    fn test_agreed_joins_and_notifies() {
        let (_dir, state) = testutil::state();
        let watcher = testutil::join_client(&state, "Watcher");
        let id = raw_client(&state);
        handle_login(&state, id, &login_tx("admin", "", 150)).unwrap();
        assert!(!state.conn_snapshot(id).unwrap().joined);

        let agreed = Transaction::new(
            TRAN_AGREED,
            vec![
                Field::new(FIELD_USER_NAME, b"Root".to_vec()),
                Field::with_u16(FIELD_USER_ICON_ID, 128),
                Field::with_u16(FIELD_OPTIONS, 0x0001),
                Field::new(FIELD_AUTOMATIC_RESPONSE, b"afk".to_vec()),
            ],
        );
        let out = handle_agreed(&state, id, &agreed).unwrap();

        let conn = state.conn_snapshot(id).unwrap();
        assert!(conn.joined);
        assert_eq!(conn.user_name, b"Root".to_vec());
        assert_eq!(conn.icon, 128);
        assert!(conn.refuses_pm());
        assert!(!conn.refuses_private_chat());
        assert_eq!(conn.auto_reply, b"afk".to_vec());

        assert_eq!(out[0], Outbound::ok());
        assert!(out.iter().any(|o| matches!(
            o,
            Outbound::Notify(target, tx) if *target == watcher && tx.ty == TRAN_NOTIFY_CHANGE_USER
        )));
    }

    #[test]
    fn test_keep_alive_is_empty_reply() {
        let (_dir, state) = testutil::state();
        let id = testutil::join_client(&state, "Alice");

        let tx = Transaction::new(TRAN_KEEP_ALIVE, Vec::new());
        let first = handle_keep_alive(&state, id, &tx).unwrap();
        let second = handle_keep_alive(&state, id, &tx).unwrap();

        assert_eq!(first, vec![Outbound::ok()]);
        assert_eq!(first, second);
    }
}
