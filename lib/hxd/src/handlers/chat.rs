//! Public chat relay and the private-chat lifecycle.

use super::*;
use crate::error::{HandlerError, HandlerResult};
use crate::registry::clients::ClientConn;
use crate::registry::PUBLIC_CHAT_ID;
use crate::state::ServerState;
use hotline::access;
use hotline::transaction::Transaction;
use hotline::types::*;
use hotline::Field;

/// Chat messages are truncated to this many bytes before formatting. The
/// cut is byte-wise and does not respect multibyte boundaries; legacy
/// clients do the same.
pub const LIMIT_CHAT_MSG: usize = 8192;

/// `"\r%13.13s:  %s"`, or the emote form `"\r*** %s %s"`. Formatting runs
/// on raw bytes so Mac-Roman nicknames pass through untouched.
pub fn format_chat(name: &[u8], msg: &[u8], emote: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(18 + name.len() + msg.len());
    out.push(b'\r');

    if emote {
        out.extend_from_slice(b"*** ");
        out.extend_from_slice(name);
        out.push(b' ');
        out.extend_from_slice(msg);
    } else {
        let shown = &name[..name.len().min(13)];
        out.resize(out.len() + 13 - shown.len(), b' ');
        out.extend_from_slice(shown);
        out.extend_from_slice(b":  ");
        out.extend_from_slice(msg);
    }

    out
}

/// `TranChatSend`: format and fan out, to one private chat or to everyone
/// who may read public chat.
pub fn handle_chat_send(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::SEND_CHAT, DENY_SEND_CHAT)?;

    let msg = tx.field_bytes(FIELD_DATA);
    let msg = &msg[..msg.len().min(LIMIT_CHAT_MSG)];
    let emote = tx.field_int(FIELD_CHAT_OPTIONS) == Some(u32::from(CHAT_OPTION_EMOTE));
    let formatted = format_chat(&conn.user_name, msg, emote);

    let chat_id = tx.field_int(FIELD_CHAT_ID).unwrap_or(PUBLIC_CHAT_ID);

    let mut out = vec![Outbound::ok()];

    if chat_id != PUBLIC_CHAT_ID {
        let members = {
            let chats = state.chats.lock().unwrap();
            match chats.get(chat_id) {
                Some(chat) if chat.has_member(origin) => chats.members(chat_id),
                _ => return Err(HandlerError::new(ERR_CHAT_NOT_FOUND)),
            }
        };

        let relay = Transaction::new(
            TRAN_CHAT_MSG,
            vec![
                Field::with_u32(FIELD_CHAT_ID, chat_id),
                Field::new(FIELD_DATA, formatted),
            ],
        );
        out.extend(members.into_iter().map(|member| Outbound::Notify(member, relay.clone())));
    } else {
        let relay = Transaction::new(TRAN_CHAT_MSG, vec![Field::new(FIELD_DATA, formatted)]);
        out.extend(state.conn_list().into_iter().filter_map(|other| {
            let other = other.lock().unwrap();
            if other.joined && other.authorize(access::READ_CHAT) {
                Some(Outbound::Notify(other.id, relay.clone()))
            } else {
                None
            }
        }));
    }

    Ok(out)
}

/// The invitation pushed at a prospective member.
fn invite_notice(chat_id: u32, inviter: &ClientConn) -> Transaction {
    Transaction::new(
        TRAN_INVITE_TO_CHAT,
        vec![
            Field::with_u32(FIELD_CHAT_ID, chat_id),
            Field::with_u16(FIELD_USER_ID, inviter.id),
            Field::new(FIELD_USER_NAME, inviter.user_name.clone()),
        ],
    )
}

/// Invite a target into a chat, honoring the refuse-private-chat flag. The
/// refusal message goes to the inviter; the target hears nothing.
fn invite(state: &ServerState, inviter: &ClientConn, chat_id: u32, target: u16) -> Vec<Outbound> {
    let target_conn = match state.conn_snapshot(target) {
        Some(conn) if conn.joined => conn,
        _ => {
            return vec![Outbound::Notify(
                inviter.id,
                server_msg(b"That user is no longer connected."),
            )]
        }
    };

    if target_conn.refuses_private_chat() {
        let name = hotline::macroman::to_utf8(&target_conn.user_name);
        return vec![Outbound::Notify(
            inviter.id,
            server_msg(format!("{} does not accept private chats.", name).as_bytes()),
        )];
    }

    state.chats.lock().unwrap().invite(chat_id, target);
    vec![Outbound::Notify(target, invite_notice(chat_id, inviter))]
}

/// `TranInviteNewChat`: allocate a private chat and invite the target.
pub fn handle_invite_new_chat(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::OPEN_CHAT, DENY_OPEN_CHAT)?;

    let target = tx.field_int(FIELD_USER_ID).ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))? as u16;

    let chat_id = state.chats.lock().unwrap().new_chat(origin);

    let mut out = vec![Outbound::reply(vec![
        Field::with_u32(FIELD_CHAT_ID, chat_id),
        Field::with_u16(FIELD_USER_ID, conn.id),
        Field::new(FIELD_USER_NAME, conn.user_name.clone()),
        Field::with_u16(FIELD_USER_ICON_ID, conn.icon),
        Field::with_u16(FIELD_USER_FLAGS, conn.flags),
    ])];
    out.extend(invite(state, &conn, chat_id, target));
    Ok(out)
}

/// `TranInviteToChat`: invite another user into an existing chat.
pub fn handle_invite_to_chat(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::OPEN_CHAT, DENY_OPEN_CHAT)?;

    let target = tx.field_int(FIELD_USER_ID).ok_or_else(|| HandlerError::new(ERR_USER_NOT_FOUND))? as u16;
    let chat_id = tx.field_int(FIELD_CHAT_ID).unwrap_or(PUBLIC_CHAT_ID);

    {
        let chats = state.chats.lock().unwrap();
        match chats.get(chat_id) {
            Some(chat) if chat.has_member(origin) => (),
            _ => return Err(HandlerError::new(ERR_CHAT_NOT_FOUND)),
        }
    }

    let mut out = vec![Outbound::ok()];
    out.extend(invite(state, &conn, chat_id, target));
    Ok(out)
}

/// `TranRejectChatInvite`: tell the members their invitee passed.
pub fn handle_reject_chat_invite(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let chat_id = tx.field_int(FIELD_CHAT_ID).unwrap_or(PUBLIC_CHAT_ID);

    let members = {
        let chats = state.chats.lock().unwrap();
        match chats.get(chat_id) {
            Some(chat) if chat.is_invited(origin) => chats.members(chat_id),
            _ => return Ok(Vec::new()),
        }
    };

    let mut notice = b"\r".to_vec();
    notice.extend_from_slice(&conn.user_name);
    notice.extend_from_slice(b" declined invitation to chat");

    let relay = Transaction::new(
        TRAN_CHAT_MSG,
        vec![
            Field::with_u32(FIELD_CHAT_ID, chat_id),
            Field::new(FIELD_DATA, notice),
        ],
    );
    Ok(members.into_iter().map(|member| Outbound::Notify(member, relay.clone())).collect())
}

/// `TranJoinChat`: join an invited chat; reply with subject and roster.
pub fn handle_join_chat(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let chat_id = tx.field_int(FIELD_CHAT_ID).unwrap_or(PUBLIC_CHAT_ID);

    let (subject, members) = {
        let mut chats = state.chats.lock().unwrap();
        if !chats.join(chat_id, origin) {
            return Err(HandlerError::new(ERR_CHAT_NOT_FOUND));
        }
        (chats.subject(chat_id), chats.members(chat_id))
    };

    let change = Transaction::new(
        TRAN_NOTIFY_CHAT_CHANGE_USER,
        vec![
            Field::with_u32(FIELD_CHAT_ID, chat_id),
            Field::with_u16(FIELD_USER_ID, conn.id),
            Field::with_u16(FIELD_USER_ICON_ID, conn.icon),
            Field::with_u16(FIELD_USER_FLAGS, conn.flags),
            Field::new(FIELD_USER_NAME, conn.user_name.clone()),
        ],
    );

    let mut out = Vec::new();
    let mut roster = vec![Field::new(FIELD_CHAT_SUBJECT, subject)];
    for member in members {
        if member != origin {
            out.push(Outbound::Notify(member, change.clone()));
        }
        if let Some(member_conn) = state.conn_snapshot(member) {
            roster.push(Field::new(FIELD_USER_NAME_WITH_INFO, user_info_payload(&member_conn)));
        }
    }

    out.insert(0, Outbound::reply(roster));
    Ok(out)
}

/// `TranLeaveChat`: drop out and tell the remaining members.
pub fn handle_leave_chat(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    origin_conn(state, origin)?;
    let chat_id = tx.field_int(FIELD_CHAT_ID).unwrap_or(PUBLIC_CHAT_ID);

    let remaining = {
        let mut chats = state.chats.lock().unwrap();
        chats.leave(chat_id, origin);
        chats.members(chat_id)
    };

    let notice = Transaction::new(
        TRAN_NOTIFY_CHAT_DELETE_USER,
        vec![
            Field::with_u32(FIELD_CHAT_ID, chat_id),
            Field::with_u16(FIELD_USER_ID, origin),
        ],
    );
    Ok(remaining.into_iter().map(|member| Outbound::Notify(member, notice.clone())).collect())
}

/// `TranSetChatSubject`: update and announce the subject line.
pub fn handle_set_chat_subject(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    origin_conn(state, origin)?;
    let chat_id = tx.field_int(FIELD_CHAT_ID).unwrap_or(PUBLIC_CHAT_ID);
    let subject = tx.field_bytes(FIELD_CHAT_SUBJECT).to_vec();

    let members = {
        let mut chats = state.chats.lock().unwrap();
        match chats.get(chat_id) {
            Some(chat) if chat.has_member(origin) => (),
            _ => return Err(HandlerError::new(ERR_CHAT_NOT_FOUND)),
        }
        chats.set_subject(chat_id, subject.clone());
        chats.members(chat_id)
    };

    let notice = Transaction::new(
        TRAN_NOTIFY_CHAT_SUBJECT,
        vec![
            Field::with_u32(FIELD_CHAT_ID, chat_id),
            Field::new(FIELD_CHAT_SUBJECT, subject),
        ],
    );
    Ok(members.into_iter().map(|member| Outbound::Notify(member, notice.clone())).collect())
}
