//! Private messages, broadcasts, presence queries and administrative
//! disconnects.

use super::*;
use crate::error::{HandlerError, HandlerResult};
use crate::logging;
use crate::registry::clients::ClientConn;
use crate::registry::transfers::TransferKind;
use crate::state::ServerState;
use hotline::access;
use hotline::macroman;
use hotline::transaction::Transaction;
use hotline::types::*;
use hotline::Field;
use std::time::Duration;

pub const MSG_TEMP_BAN: &str = "You are temporarily banned on this server";
pub const MSG_PERM_BAN: &str = "You are permanently banned on this server";

/// Grace between the farewell message and the forced close.
pub const DISCONNECT_DELAY: Duration = Duration::from_secs(1);

/// `TranSendInstantMsg`: deliver a PM, honoring the refuse flag and echoing
/// the target's auto-reply. The sender always gets a success reply.
pub fn handle_send_instant_msg(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::SEND_PRIV_MSG, DENY_SEND_PRIV_MSG)?;

    let target = tx.field_int(FIELD_USER_ID).ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))? as u16;
    let options = tx.field_int(FIELD_OPTIONS).unwrap_or(1);

    let target_conn = state
        .conn_snapshot(target)
        .filter(|c| c.joined)
        .ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))?;

    let mut out = vec![Outbound::ok()];

    if target_conn.refuses_pm() {
        let name = macroman::to_utf8(&target_conn.user_name);
        out.push(Outbound::Notify(
            origin,
            server_msg(format!("{} does not accept private messages.", name).as_bytes()),
        ));
        return Ok(out);
    }

    out.push(Outbound::Notify(
        target,
        Transaction::new(
            TRAN_SERVER_MSG,
            vec![
                Field::new(FIELD_DATA, tx.field_bytes(FIELD_DATA).to_vec()),
                Field::new(FIELD_USER_NAME, conn.user_name.clone()),
                Field::with_u16(FIELD_USER_ID, conn.id),
                Field::with_u32(FIELD_OPTIONS, options),
            ],
        ),
    ));

    if !target_conn.auto_reply.is_empty() {
        out.push(Outbound::Notify(
            origin,
            Transaction::new(
                TRAN_SERVER_MSG,
                vec![
                    Field::new(FIELD_DATA, target_conn.auto_reply.clone()),
                    Field::new(FIELD_USER_NAME, target_conn.user_name.clone()),
                    Field::with_u16(FIELD_USER_ID, target_conn.id),
                    Field::with_u32(FIELD_OPTIONS, 1),
                ],
            ),
        ));
    }

    Ok(out)
}

/// `TranUserBroadcast`: server message to every joined client.
pub fn handle_user_broadcast(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::BROADCAST, DENY_BROADCAST)?;

    let notice = Transaction::new(
        TRAN_SERVER_MSG,
        vec![
            Field::new(FIELD_DATA, tx.field_bytes(FIELD_DATA).to_vec()),
            Field::with_u16(FIELD_CHAT_OPTIONS, 1),
        ],
    );

    let mut out = vec![Outbound::ok()];
    out.extend(state.conn_list().into_iter().filter_map(|other| {
        let other = other.lock().unwrap();
        if other.joined {
            Some(Outbound::Notify(other.id, notice.clone()))
        } else {
            None
        }
    }));
    Ok(out)
}

/// `TranDisconnectUser`: kick a user, optionally banning the address. The
/// close itself runs a second later so the farewell can drain.
pub fn handle_disconnect_user(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::DISCONNECT_USER, DENY_DISCONNECT_USER)?;

    let target = tx.field_int(FIELD_USER_ID).ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))? as u16;
    let target_conn = state
        .conn_snapshot(target)
        .ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))?;

    if !target_conn.can_be_disconnected() {
        return Err(HandlerError::new(DENY_CANNOT_DISCONNECT));
    }

    let mut out = vec![Outbound::ok()];

    match tx.field_int(FIELD_OPTIONS).unwrap_or(0) {
        1 => {
            state
                .bans
                .lock()
                .unwrap()
                .add_temporary(target_conn.remote_ip())
                .map_err(|_| HandlerError::new("Unable to save the ban list."))?;
            out.push(Outbound::Notify(target, server_msg(MSG_TEMP_BAN.as_bytes())));
        }
        2 => {
            state
                .bans
                .lock()
                .unwrap()
                .add(target_conn.remote_ip(), None)
                .map_err(|_| HandlerError::new("Unable to save the ban list."))?;
            out.push(Outbound::Notify(target, server_msg(MSG_PERM_BAN.as_bytes())));
        }
        _ => (),
    }

    logging::info!(state.log, "disconnecting user";
                   "target" => target, "by" => origin, "addr" => target_conn.remote_ip());
    state.schedule_disconnect(target, DISCONNECT_DELAY);
    Ok(out)
}

/// `TranGetUserNameList`: one `UsernameWithInfo` field per joined client.
pub fn handle_get_user_name_list(state: &ServerState, origin: u16, _tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    origin_conn(state, origin)?;

    let fields: Vec<Field> = state
        .conn_list()
        .into_iter()
        .filter_map(|other| {
            let other = other.lock().unwrap();
            if other.joined {
                Some(Field::new(FIELD_USER_NAME_WITH_INFO, user_info_payload(&other)))
            } else {
                None
            }
        })
        .collect();

    Ok(vec![Outbound::reply(fields)])
}

fn transfer_section(state: &ServerState, client_id: u16, kind: TransferKind) -> String {
    state
        .transfers
        .lock()
        .unwrap()
        .list_for_client(client_id)
        .into_iter()
        .filter(|t| t.kind == kind)
        .map(|t| format!("{}\r", macroman::to_utf8(&t.file_name)))
        .collect()
}

/// The fixed info-text layout legacy clients parse.
pub fn client_info_text(state: &ServerState, target: &ClientConn) -> String {
    format!(
        "Nickname:   {}\rName:       {}\rAccount:    {}\rAddress:    {}\r\r\
         -------- File Downloads ---------\r\r{}\
         ------- Folder Downloads --------\r\r{}\
         --------- File Uploads ----------\r\r{}\
         -------- Folder Uploads ---------\r\r{}\
         ------- Waiting Downloads -------\r\r",
        macroman::to_utf8(&target.user_name),
        target.account_name,
        target.login,
        target.remote_addr,
        transfer_section(state, target.id, TransferKind::FileDownload),
        transfer_section(state, target.id, TransferKind::FolderDownload),
        transfer_section(state, target.id, TransferKind::FileUpload),
        transfer_section(state, target.id, TransferKind::FolderUpload),
    )
}

/// `TranGetClientInfoText`: render the template for a target connection.
pub fn handle_get_client_info_text(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::GET_CLIENT_INFO, DENY_GET_CLIENT_INFO)?;

    let target = tx.field_int(FIELD_USER_ID).ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))? as u16;
    let target_conn = state
        .conn_snapshot(target)
        .ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))?;

    Ok(vec![Outbound::reply(vec![
        Field::with_str(FIELD_DATA, &client_info_text(state, &target_conn)),
        Field::new(FIELD_USER_NAME, target_conn.user_name.clone()),
    ])])
}

/// `TranSetClientUserInfo`: mid-session presence update; re-announced to
/// everyone.
pub fn handle_set_client_user_info(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;

    let shared = state.conn(origin).ok_or_else(|| HandlerError::new(ERR_NOT_LOGGED_IN))?;
    let snapshot = {
        let mut guard = shared.lock().unwrap();

        let requested_name = tx.field_bytes(FIELD_USER_NAME);
        if !requested_name.is_empty() && conn.access.is_set(access::ANY_NAME) {
            guard.user_name = requested_name.to_vec();
        }
        if let Some(icon) = tx.field_int(FIELD_USER_ICON_ID) {
            guard.icon = icon as u16;
        }
        if let Some(options) = tx.field_int(FIELD_OPTIONS) {
            let options = options as u16;
            let mut flags = guard.flags & !(USER_FLAG_REFUSE_PM | USER_FLAG_REFUSE_CHAT);
            if options & 0x0001 != 0 {
                flags |= USER_FLAG_REFUSE_PM;
            }
            if options & 0x0002 != 0 {
                flags |= USER_FLAG_REFUSE_CHAT;
            }
            guard.flags = flags;
        }
        if let Some(auto_reply) = tx.get_field(FIELD_AUTOMATIC_RESPONSE) {
            guard.auto_reply = auto_reply.data.clone();
        }

        guard.clone()
    };

    let notice = notify_change_user(&snapshot);
    Ok(state
        .conn_list()
        .into_iter()
        .filter_map(|other| {
            let other = other.lock().unwrap();
            if other.joined {
                Some(Outbound::Notify(other.id, notice.clone()))
            } else {
                None
            }
        })
        .collect())
}
