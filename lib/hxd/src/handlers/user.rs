//! Account administration: list, inspect, create, modify, delete, and the
//! batched `UpdateUser` form newer clients send.

use super::*;
use crate::error::{HandlerError, HandlerResult};
use crate::logging;
use crate::registry::accounts::{hash_password, valid_login, Account};
use crate::state::ServerState;
use byteorder::{BigEndian, ReadBytesExt};
use hotline::access::{self, AccessBitmap};
use hotline::obfuscate::obfuscate;
use hotline::transaction::Transaction;
use hotline::types::*;
use hotline::Field;
use std::io::Cursor;

/// Serialized account as carried inside a `Data` field: a 2-byte field
/// count followed by ordinary wire fields.
pub fn account_payload(account: &Account) -> Vec<u8> {
    let fields = vec![
        Field::with_str(FIELD_USER_NAME, &account.name),
        Field::new(FIELD_USER_LOGIN, obfuscate(account.login.as_bytes())),
        Field::new(FIELD_USER_ACCESS, account.access.bytes().to_vec()),
    ];

    let mut buf = Vec::new();
    buf.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for field in fields {
        field.write_to(&mut buf).expect("account fields are short");
    }
    buf
}

/// Parse the sub-fields of one batched account entry.
pub fn decode_account_payload(data: &[u8]) -> HandlerResult<Vec<Field>> {
    let mut stream = Cursor::new(data);
    let count = stream
        .read_u16::<BigEndian>()
        .map_err(|_| HandlerError::new(ERR_UNSUPPORTED))?;

    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        fields.push(Field::read_from(&mut stream).map_err(|_| HandlerError::new(ERR_UNSUPPORTED))?);
    }
    Ok(fields)
}

fn first<'a>(fields: &'a [Field], id: u16) -> Option<&'a Field> {
    fields.iter().find(|field| field.id == id)
}

/// `TranListUsers`: every account, one `Data` field each.
pub fn handle_list_users(state: &ServerState, origin: u16, _tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::OPEN_USER, DENY_OPEN_USER)?;

    let accounts = state.accounts.lock().unwrap().list();
    let fields = accounts
        .iter()
        .map(|account| Field::new(FIELD_DATA, account_payload(account)))
        .collect();

    Ok(vec![Outbound::reply(fields)])
}

/// `TranGetUser`: one account's editable state. The password is never
/// disclosed; the single-zero-byte placeholder means "unchanged" when the
/// client sends the form back.
pub fn handle_get_user(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::OPEN_USER, DENY_OPEN_USER)?;

    let login = String::from_utf8_lossy(tx.field_bytes(FIELD_USER_LOGIN)).into_owned();
    let account = state
        .accounts
        .lock()
        .unwrap()
        .get(&login)
        .ok_or_else(|| HandlerError::new(ERR_ACCOUNT_NOT_FOUND))?;

    Ok(vec![Outbound::reply(vec![
        Field::with_str(FIELD_USER_NAME, &account.name),
        Field::new(FIELD_USER_LOGIN, obfuscate(account.login.as_bytes())),
        Field::new(FIELD_USER_PASSWORD, vec![0]),
        Field::new(FIELD_USER_ACCESS, account.access.bytes().to_vec()),
    ])])
}

fn requested_access(fields_access: Option<&[u8]>) -> AccessBitmap {
    fields_access.map(AccessBitmap::from).unwrap_or_default()
}

/// `TranNewUser`: create an account. Every one of the 64 requested bits
/// must be held by the caller.
pub fn handle_new_user(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::CREATE_USER, DENY_CREATE_USER)?;

    let login = String::from_utf8_lossy(&obfuscate(tx.field_bytes(FIELD_USER_LOGIN))).into_owned();
    if !valid_login(&login) {
        return Err(HandlerError::new(ERR_ACCOUNT_EXISTS));
    }

    let requested = requested_access(tx.get_field(FIELD_USER_ACCESS).map(|f| &f.data[..]));
    if !conn.access.covers(&requested) {
        return Err(HandlerError::new(DENY_GRANT_UNHELD));
    }

    let account = Account {
        login,
        name: String::from_utf8_lossy(tx.field_bytes(FIELD_USER_NAME)).into_owned(),
        password: hash_password(tx.field_bytes(FIELD_USER_PASSWORD)),
        access: requested,
    };

    state.accounts.lock().unwrap().create(account).map_err(|err| {
        if err.kind() == std::io::ErrorKind::AlreadyExists {
            HandlerError::new(ERR_ACCOUNT_EXISTS)
        } else {
            HandlerError::new("Unable to save the account.")
        }
    })?;

    Ok(vec![Outbound::ok()])
}

/// Apply the protocol's three-state password rule: absent clears, a single
/// zero byte preserves, anything else re-hashes.
fn apply_password_rule(current: &str, field: Option<&Field>) -> String {
    match field {
        None => String::new(),
        Some(field) if field.data == [0] => current.to_string(),
        Some(field) => hash_password(&field.data),
    }
}

/// Push the new access bytes at live connections using the account, per
/// the contract that a `SetUser` is observed exactly once by each.
fn refresh_live_conns(state: &ServerState, account: &Account) -> Vec<Outbound> {
    let mut out = Vec::new();
    for shared in state.conn_list() {
        let mut guard = shared.lock().unwrap();
        if guard.login == account.login {
            guard.access = account.access;
            guard.account_name = account.name.clone();
            out.push(Outbound::Notify(
                guard.id,
                Transaction::new(
                    TRAN_USER_ACCESS,
                    vec![Field::new(FIELD_USER_ACCESS, account.access.bytes().to_vec())],
                ),
            ));
        }
    }
    out
}

/// `TranSetUser`: modify name, password and access of one account.
pub fn handle_set_user(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::MODIFY_USER, DENY_MODIFY_USER)?;

    let login = String::from_utf8_lossy(&obfuscate(tx.field_bytes(FIELD_USER_LOGIN))).into_owned();

    let mut account = state
        .accounts
        .lock()
        .unwrap()
        .get(&login)
        .ok_or_else(|| HandlerError::new(ERR_ACCOUNT_NOT_FOUND))?;

    if let Some(name) = tx.get_field(FIELD_USER_NAME) {
        account.name = String::from_utf8_lossy(&name.data).into_owned();
    }
    account.password = apply_password_rule(&account.password, tx.get_field(FIELD_USER_PASSWORD));
    if let Some(access_field) = tx.get_field(FIELD_USER_ACCESS) {
        account.access = AccessBitmap::from(&access_field.data[..]);
    }

    state
        .accounts
        .lock()
        .unwrap()
        .update(account.clone(), None)
        .map_err(|_| HandlerError::new("Unable to save the account."))?;

    let mut out = vec![Outbound::ok()];
    out.extend(refresh_live_conns(state, &account));
    Ok(out)
}

/// `TranDeleteUser`: remove the account and force off anyone logged in
/// with it.
pub fn handle_delete_user(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::DELETE_USER, DENY_DELETE_USER)?;

    let login = String::from_utf8_lossy(&obfuscate(tx.field_bytes(FIELD_USER_LOGIN))).into_owned();

    state
        .accounts
        .lock()
        .unwrap()
        .delete(&login)
        .map_err(|_| HandlerError::new(ERR_ACCOUNT_NOT_FOUND))?;

    // The resolved account is now stale; close those connections.
    for shared in state.conn_list() {
        let guard = shared.lock().unwrap();
        if guard.login == login {
            state.schedule_disconnect(guard.id, std::time::Duration::from_secs(1));
        }
    }

    logging::info!(state.log, "account deleted by operator"; "login" => &login, "by" => origin);
    Ok(vec![Outbound::ok()])
}

/// `TranUpdateUser`: batched account changes. Each `Data` field carries one
/// serialized account; an entry with only a login deletes that account.
pub fn handle_update_user(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;

    let mut out = vec![Outbound::ok()];

    for entry in tx.fields_with_id(FIELD_DATA) {
        let subfields = decode_account_payload(&entry.data)?;

        let login_field = first(&subfields, FIELD_USER_LOGIN)
            .ok_or_else(|| HandlerError::new(ERR_ACCOUNT_NOT_FOUND))?;
        let login = String::from_utf8_lossy(&obfuscate(&login_field.data)).into_owned();

        if subfields.len() == 1 {
            require(&conn, access::DELETE_USER, DENY_DELETE_USER)?;
            state
                .accounts
                .lock()
                .unwrap()
                .delete(&login)
                .map_err(|_| HandlerError::new(ERR_ACCOUNT_NOT_FOUND))?;
            continue;
        }

        let existing = state.accounts.lock().unwrap().get(&login);
        match existing {
            Some(mut account) => {
                require(&conn, access::MODIFY_USER, DENY_MODIFY_USER)?;

                if let Some(name) = first(&subfields, FIELD_USER_NAME) {
                    account.name = String::from_utf8_lossy(&name.data).into_owned();
                }
                account.password =
                    apply_password_rule(&account.password, first(&subfields, FIELD_USER_PASSWORD));
                if let Some(access_field) = first(&subfields, FIELD_USER_ACCESS) {
                    account.access = AccessBitmap::from(&access_field.data[..]);
                }

                state
                    .accounts
                    .lock()
                    .unwrap()
                    .update(account.clone(), None)
                    .map_err(|_| HandlerError::new("Unable to save the account."))?;
                out.extend(refresh_live_conns(state, &account));
            }
            None => {
                require(&conn, access::CREATE_USER, DENY_CREATE_USER)?;
                if !valid_login(&login) {
                    return Err(HandlerError::new(ERR_ACCOUNT_EXISTS));
                }

                let requested =
                    requested_access(first(&subfields, FIELD_USER_ACCESS).map(|f| &f.data[..]));
                if !conn.access.covers(&requested) {
                    return Err(HandlerError::new(DENY_GRANT_UNHELD));
                }

                let password = first(&subfields, FIELD_USER_PASSWORD)
                    .map(|field| hash_password(&field.data))
                    .unwrap_or_default();

                state
                    .accounts
                    .lock()
                    .unwrap()
                    .create(Account {
                        login,
                        name: first(&subfields, FIELD_USER_NAME)
                            .map(|field| String::from_utf8_lossy(&field.data).into_owned())
                            .unwrap_or_default(),
                        password,
                        access: requested,
                    })
                    .map_err(|_| HandlerError::new(ERR_ACCOUNT_EXISTS))?;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil;

    fn account_entry(fields: Vec<Field>) -> Field {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for field in fields {
            field.write_to(&mut buf).unwrap();
        }
        Field::new(FIELD_DATA, buf)
    }

    #[test]
    fn test_account_payload_roundtrip() {
        let account = Account {
            login: "alice".to_string(),
            name: "Alice".to_string(),
            password: String::new(),
            access: AccessBitmap::full(),
        };

        let fields = decode_account_payload(&account_payload(&account)).unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(obfuscate(&first(&fields, FIELD_USER_LOGIN).unwrap().data), b"alice".to_vec());
        assert_eq!(first(&fields, FIELD_USER_ACCESS).unwrap().data, vec![0xFF; 8]);
    }

    #[test]
    fn test_new_user_and_get_user() {
        let (_dir, state) = testutil::state();
        let admin = testutil::join_client(&state, "Admin");

        let tx = Transaction::new(
            TRAN_NEW_USER,
            vec![
                Field::new(FIELD_USER_LOGIN, obfuscate(b"alice")),
                Field::with_str(FIELD_USER_NAME, "Alice"),
                Field::new(FIELD_USER_PASSWORD, b"pw".to_vec()),
                Field::new(FIELD_USER_ACCESS, vec![0x00, 0x40, 0, 0, 0, 0, 0, 0]),
            ],
        );
        assert_eq!(handle_new_user(&state, admin, &tx).unwrap(), vec![Outbound::ok()]);

        let account = state.accounts.lock().unwrap().get("alice").unwrap();
        assert!(account.verify_password(b"pw"));
        assert!(account.access.is_set(access::READ_CHAT));

        let get = Transaction::new(TRAN_GET_USER, vec![Field::with_str(FIELD_USER_LOGIN, "alice")]);
        let out = handle_get_user(&state, admin, &get).unwrap();
        match &out[0] {
            Outbound::Reply(reply) => {
                assert_eq!(reply.field_bytes(FIELD_USER_NAME), b"Alice".as_ref());
                assert_eq!(obfuscate(reply.field_bytes(FIELD_USER_LOGIN)), b"alice".to_vec());
                assert_eq!(reply.field_bytes(FIELD_USER_PASSWORD), &[0]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_new_user_cannot_grant_unheld_bits() {
        let (_dir, state) = testutil::state();
        let mut limited = AccessBitmap::default();
        limited.set(access::CREATE_USER, true);
        let operator = testutil::join_client_with_access(&state, "Op", limited);

        let tx = Transaction::new(
            TRAN_NEW_USER,
            vec![
                Field::new(FIELD_USER_LOGIN, obfuscate(b"evil")),
                Field::new(FIELD_USER_ACCESS, vec![0xFF; 8]),
            ],
        );
        let err = handle_new_user(&state, operator, &tx).unwrap_err();

        assert_eq!(err.0, DENY_GRANT_UNHELD);
        assert!(!state.accounts.lock().unwrap().exists("evil"));
    }

    #[test]
    fn test_new_user_duplicate() {
        let (_dir, state) = testutil::state();
        let admin = testutil::join_client(&state, "Admin");

        let tx = Transaction::new(
            TRAN_NEW_USER,
            vec![Field::new(FIELD_USER_LOGIN, obfuscate(b"guest"))],
        );
        let err = handle_new_user(&state, admin, &tx).unwrap_err();

        assert_eq!(err.0, ERR_ACCOUNT_EXISTS);
    }

    #[test]
    fn test_set_user_password_tristate() {
        let (_dir, state) = testutil::state();
        let admin = testutil::join_client(&state, "Admin");
        state
            .accounts
            .lock()
            .unwrap()
            .create(Account {
                login: "alice".to_string(),
                name: "Alice".to_string(),
                password: hash_password(b"original"),
                access: AccessBitmap::default(),
            })
            .unwrap();

        // Single zero byte: password unchanged.
        let keep = Transaction::new(
            TRAN_SET_USER,
            vec![
                Field::new(FIELD_USER_LOGIN, obfuscate(b"alice")),
                Field::new(FIELD_USER_PASSWORD, vec![0]),
            ],
        );
        handle_set_user(&state, admin, &keep).unwrap();
        assert!(state.accounts.lock().unwrap().get("alice").unwrap().verify_password(b"original"));

        // Other value: re-hash.
        let change = Transaction::new(
            TRAN_SET_USER,
            vec![
                Field::new(FIELD_USER_LOGIN, obfuscate(b"alice")),
                Field::new(FIELD_USER_PASSWORD, b"fresh".to_vec()),
            ],
        );
        handle_set_user(&state, admin, &change).unwrap();
        assert!(state.accounts.lock().unwrap().get("alice").unwrap().verify_password(b"fresh"));

        // Absent field: cleared.
        let clear = Transaction::new(
            TRAN_SET_USER,
            vec![Field::new(FIELD_USER_LOGIN, obfuscate(b"alice"))],
        );
        handle_set_user(&state, admin, &clear).unwrap();
        assert!(state.accounts.lock().unwrap().get("alice").unwrap().verify_password(b""));
    }

    #[test]
    fn test_set_user_pushes_access_to_live_conn() {
        let (_dir, state) = testutil::state();
        let admin = testutil::join_client(&state, "Admin");
        let guest_conn = testutil::join_client(&state, "Visitor");
        state.conn(guest_conn).unwrap().lock().unwrap().login = "guest".to_string();

        let mut new_access = AccessBitmap::default();
        new_access.set(access::READ_CHAT, true);
        let tx = Transaction::new(
            TRAN_SET_USER,
            vec![
                Field::new(FIELD_USER_LOGIN, obfuscate(b"guest")),
                Field::new(FIELD_USER_PASSWORD, vec![0]),
                Field::new(FIELD_USER_ACCESS, new_access.bytes().to_vec()),
            ],
        );
        let out = handle_set_user(&state, admin, &tx).unwrap();

        let pushes: Vec<&Outbound> = out
            .iter()
            .filter(|o| matches!(o, Outbound::Notify(target, tx) if *target == guest_conn && tx.ty == TRAN_USER_ACCESS))
            .collect();
        assert_eq!(pushes.len(), 1, "exactly one TranUserAccess per live conn");
        assert_eq!(state.conn_snapshot(guest_conn).unwrap().access, new_access);
    }

    #[test]
    fn test_delete_user_disconnects_live_conns() {
        let (_dir, state) = testutil::state();
        let admin = testutil::join_client(&state, "Admin");
        let guest_conn = testutil::join_client(&state, "Visitor");
        state.conn(guest_conn).unwrap().lock().unwrap().login = "guest".to_string();

        let tx = Transaction::new(
            TRAN_DELETE_USER,
            vec![Field::new(FIELD_USER_LOGIN, obfuscate(b"guest"))],
        );
        handle_delete_user(&state, admin, &tx).unwrap();

        assert!(!state.accounts.lock().unwrap().exists("guest"));
        let pending = state.pending_disconnects.lock().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].client_id, guest_conn);
    }

    #[test]
    fn test_update_user_batch_create_and_delete() {
        let (_dir, state) = testutil::state();
        let admin = testutil::join_client(&state, "Admin");

        // Create one account, delete another, in one batch.
        let create = account_entry(vec![
            Field::new(FIELD_USER_LOGIN, obfuscate(b"bob")),
            Field::with_str(FIELD_USER_NAME, "Bob"),
            Field::new(FIELD_USER_PASSWORD, b"pw".to_vec()),
            Field::new(FIELD_USER_ACCESS, vec![0; 8]),
        ]);
        let delete = account_entry(vec![Field::new(FIELD_USER_LOGIN, obfuscate(b"guest"))]);

        let tx = Transaction::new(TRAN_UPDATE_USER, vec![create, delete]);
        handle_update_user(&state, admin, &tx).unwrap();

        let accounts = state.accounts.lock().unwrap();
        assert!(accounts.exists("bob"));
        assert!(!accounts.exists("guest"));
    }

    #[test]
    fn test_update_user_create_checks_grants() {
        let (_dir, state) = testutil::state();
        let mut limited = AccessBitmap::default();
        limited.set(access::CREATE_USER, true);
        let operator = testutil::join_client_with_access(&state, "Op", limited);

        let entry = account_entry(vec![
            Field::new(FIELD_USER_LOGIN, obfuscate(b"evil")),
            Field::new(FIELD_USER_ACCESS, vec![0xFF; 8]),
        ]);
        let tx = Transaction::new(TRAN_UPDATE_USER, vec![entry]);

        let err = handle_update_user(&state, operator, &tx).unwrap_err();
        assert_eq!(err.0, DENY_GRANT_UNHELD);
    }

    #[test]
    fn test_list_users_requires_permission() {
        let (_dir, state) = testutil::state();
        let nobody = testutil::join_client_with_access(&state, "Nobody", AccessBitmap::default());

        let err = handle_list_users(&state, nobody, &Transaction::new(TRAN_LIST_USERS, vec![])).unwrap_err();
        assert_eq!(err.0, DENY_OPEN_USER);
    }
}
