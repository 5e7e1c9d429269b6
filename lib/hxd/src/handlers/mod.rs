//! The transaction handler table.
//!
//! One function per transaction type. A handler reads named fields off the
//! request, consults the registries (one lock at a time, never held across
//! an enqueue) and returns the ordered outbound transactions. The poll loop
//! stamps ids and routes them.

pub mod chat;
pub mod file;
pub mod message;
pub mod news;
pub mod session;
pub mod user;

use crate::error::{HandlerError, HandlerResult};
use crate::logging;
use crate::state::ServerState;
use hotline::payload::UserNameWithInfo;
use hotline::transaction::Transaction;
use hotline::types::*;
use hotline::Field;

use crate::registry::clients::ClientConn;

// Canonical user-visible denial strings. These are protocol surface:
// clients show them verbatim and tests compare them byte-for-byte.
pub const DENY_DELETE_FILE: &str = "You are not allowed to delete files.";
pub const DENY_UPLOAD_FILE: &str = "You are not allowed to upload files.";
pub const DENY_DOWNLOAD_FILE: &str = "You are not allowed to download files.";
pub const DENY_DOWNLOAD_FOLDER: &str = "You are not allowed to download folders.";
pub const DENY_UPLOAD_FOLDER: &str = "You are not allowed to upload folders.";
pub const DENY_RENAME_FILE: &str = "You are not allowed to rename files.";
pub const DENY_MOVE_FILE: &str = "You are not allowed to move files.";
pub const DENY_CREATE_FOLDER: &str = "You are not allowed to create folders.";
pub const DENY_DELETE_FOLDER: &str = "You are not allowed to delete folders.";
pub const DENY_RENAME_FOLDER: &str = "You are not allowed to rename folders.";
pub const DENY_MOVE_FOLDER: &str = "You are not allowed to move folders.";
pub const DENY_VIEW_DROP_BOXES: &str = "You are not allowed to view drop boxes.";
pub const DENY_SEND_CHAT: &str = "You are not allowed to participate in chat.";
pub const DENY_OPEN_CHAT: &str = "You are not allowed to request private chat.";
pub const DENY_SEND_PRIV_MSG: &str = "You are not allowed to send private messages.";
pub const DENY_CREATE_USER: &str = "You are not allowed to create new accounts.";
pub const DENY_DELETE_USER: &str = "You are not allowed to delete accounts.";
pub const DENY_OPEN_USER: &str = "You are not allowed to view accounts.";
pub const DENY_MODIFY_USER: &str = "You are not allowed to modify accounts.";
pub const DENY_READ_NEWS: &str = "You are not allowed to read news.";
pub const DENY_POST_NEWS: &str = "You are not allowed to post news.";
pub const DENY_DELETE_NEWS_ART: &str = "You are not allowed to delete news articles.";
pub const DENY_CREATE_NEWS_CAT: &str = "You are not allowed to create news categories.";
pub const DENY_DELETE_NEWS_CAT: &str = "You are not allowed to delete news categories.";
pub const DENY_CREATE_NEWS_FLDR: &str = "You are not allowed to create news folders.";
pub const DENY_DELETE_NEWS_FLDR: &str = "You are not allowed to delete news folders.";
pub const DENY_DISCONNECT_USER: &str = "You are not allowed to disconnect users.";
pub const DENY_CANNOT_DISCONNECT: &str = "You cannot disconnect this user.";
pub const DENY_GET_CLIENT_INFO: &str = "You are not allowed to get client info.";
pub const DENY_MAKE_ALIAS: &str = "You are not allowed to make aliases.";
pub const DENY_BROADCAST: &str = "You are not allowed to send broadcast messages.";
pub const DENY_SET_FILE_COMMENT: &str = "You are not allowed to set file comments.";
pub const DENY_SET_FOLDER_COMMENT: &str = "You are not allowed to set folder comments.";
pub const DENY_GRANT_UNHELD: &str = "Cannot create account with more access than yourself.";

pub const ERR_NOT_LOGGED_IN: &str = "You are not logged in.";
pub const ERR_UNSUPPORTED: &str = "Unsupported transaction type.";
pub const ERR_USER_NOT_FOUND: &str = "User not found.";
pub const ERR_ACCOUNT_NOT_FOUND: &str = "Account not found.";
pub const ERR_ACCOUNT_EXISTS: &str = "Cannot create account because there is already an account with that login.";
pub const ERR_FILE_NOT_FOUND: &str = "File not found.";
pub const ERR_FILE_EXISTS: &str = "There is already a file with that name.";
pub const ERR_FOLDER_EXISTS: &str = "There is already a folder with that name.";
pub const ERR_CHAT_NOT_FOUND: &str = "Chat not found.";
pub const ERR_ARTICLE_NOT_FOUND: &str = "Article not found.";
pub const ERR_NEWS_PATH: &str = "News category not found.";
pub const ERR_BAD_PATH: &str = "Cannot access the specified path.";
pub const ERR_TRANSFER_LIMIT: &str = "Too many simultaneous transfers.";

/// One routed outbound transaction.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outbound {
    /// Reply to the origin: `isReply=1`, id echoed from the request.
    Reply(Transaction),
    /// New transaction to the given client id, stamped with a fresh id.
    Notify(u16, Transaction),
}

impl Outbound {
    /// Success reply with the given fields.
    pub fn reply(fields: Vec<Field>) -> Outbound {
        Outbound::Reply(Transaction::reply(fields))
    }

    /// Empty success reply.
    pub fn ok() -> Outbound {
        Outbound::Reply(Transaction::reply(Vec::new()))
    }
}

/// Permission gate. Runs before any side effect in every mutating handler.
pub fn require(conn: &ClientConn, bit: u8, deny: &'static str) -> HandlerResult<()> {
    if conn.authorize(bit) {
        Ok(())
    } else {
        Err(HandlerError::new(deny))
    }
}

/// Snapshot of the origin connection, or a not-logged-in error for types
/// that need an authenticated caller.
pub fn origin_conn(state: &ServerState, client_id: u16) -> HandlerResult<ClientConn> {
    match state.conn_snapshot(client_id) {
        Some(conn) if conn.logged_in => Ok(conn),
        _ => Err(HandlerError::new(ERR_NOT_LOGGED_IN)),
    }
}

/// The `UsernameWithInfo` payload for a connection.
pub fn user_info_payload(conn: &ClientConn) -> Vec<u8> {
    UserNameWithInfo {
        id: conn.id,
        icon: conn.icon,
        flags: conn.flags,
        name: conn.user_name.clone(),
    }
    .encode()
}

/// `TranNotifyChangeUser` describing a connection's current presence.
pub fn notify_change_user(conn: &ClientConn) -> Transaction {
    Transaction::new(
        TRAN_NOTIFY_CHANGE_USER,
        vec![
            Field::with_u16(FIELD_USER_ID, conn.id),
            Field::with_u16(FIELD_USER_ICON_ID, conn.icon),
            Field::with_u16(FIELD_USER_FLAGS, conn.flags),
            Field::new(FIELD_USER_NAME, conn.user_name.clone()),
        ],
    )
}

/// A plain server message carrying only text.
pub fn server_msg(text: &[u8]) -> Transaction {
    Transaction::new(TRAN_SERVER_MSG, vec![Field::new(FIELD_DATA, text.to_vec())])
}

/// Route one request to its handler. Handler failures become error replies;
/// unknown types get the generic unsupported-transaction reply.
pub fn dispatch(state: &ServerState, origin: u16, tx: &Transaction) -> Vec<Outbound> {
    let result = match tx.ty {
        TRAN_LOGIN => session::handle_login(state, origin, tx),
        TRAN_AGREED => session::handle_agreed(state, origin, tx),
        TRAN_KEEP_ALIVE => session::handle_keep_alive(state, origin, tx),

        TRAN_CHAT_SEND => chat::handle_chat_send(state, origin, tx),
        TRAN_INVITE_NEW_CHAT => chat::handle_invite_new_chat(state, origin, tx),
        TRAN_INVITE_TO_CHAT => chat::handle_invite_to_chat(state, origin, tx),
        TRAN_REJECT_CHAT_INVITE => chat::handle_reject_chat_invite(state, origin, tx),
        TRAN_JOIN_CHAT => chat::handle_join_chat(state, origin, tx),
        TRAN_LEAVE_CHAT => chat::handle_leave_chat(state, origin, tx),
        TRAN_SET_CHAT_SUBJECT => chat::handle_set_chat_subject(state, origin, tx),

        TRAN_SEND_INSTANT_MSG => message::handle_send_instant_msg(state, origin, tx),
        TRAN_USER_BROADCAST => message::handle_user_broadcast(state, origin, tx),
        TRAN_DISCONNECT_USER => message::handle_disconnect_user(state, origin, tx),
        TRAN_GET_USER_NAME_LIST => message::handle_get_user_name_list(state, origin, tx),
        TRAN_GET_CLIENT_INFO_TEXT => message::handle_get_client_info_text(state, origin, tx),
        TRAN_SET_CLIENT_USER_INFO => message::handle_set_client_user_info(state, origin, tx),

        TRAN_LIST_USERS => user::handle_list_users(state, origin, tx),
        TRAN_NEW_USER => user::handle_new_user(state, origin, tx),
        TRAN_GET_USER => user::handle_get_user(state, origin, tx),
        TRAN_SET_USER => user::handle_set_user(state, origin, tx),
        TRAN_DELETE_USER => user::handle_delete_user(state, origin, tx),
        TRAN_UPDATE_USER => user::handle_update_user(state, origin, tx),

        TRAN_GET_FILE_NAME_LIST => file::handle_get_file_name_list(state, origin, tx),
        TRAN_GET_FILE_INFO => file::handle_get_file_info(state, origin, tx),
        TRAN_SET_FILE_INFO => file::handle_set_file_info(state, origin, tx),
        TRAN_DELETE_FILE => file::handle_delete_file(state, origin, tx),
        TRAN_MOVE_FILE => file::handle_move_file(state, origin, tx),
        TRAN_NEW_FOLDER => file::handle_new_folder(state, origin, tx),
        TRAN_MAKE_FILE_ALIAS => file::handle_make_file_alias(state, origin, tx),
        TRAN_DOWNLOAD_FILE => file::handle_download_file(state, origin, tx),
        TRAN_DOWNLOAD_FLDR => file::handle_download_folder(state, origin, tx),
        TRAN_UPLOAD_FILE => file::handle_upload_file(state, origin, tx),
        TRAN_UPLOAD_FLDR => file::handle_upload_folder(state, origin, tx),
        TRAN_DOWNLOAD_BANNER => file::handle_download_banner(state, origin, tx),

        TRAN_GET_MSGS => news::handle_get_msgs(state, origin, tx),
        TRAN_OLD_POST_NEWS => news::handle_old_post_news(state, origin, tx),
        TRAN_GET_NEWS_CAT_NAME_LIST => news::handle_get_news_cat_name_list(state, origin, tx),
        TRAN_GET_NEWS_ART_NAME_LIST => news::handle_get_news_art_name_list(state, origin, tx),
        TRAN_GET_NEWS_ART_DATA => news::handle_get_news_art_data(state, origin, tx),
        TRAN_NEW_NEWS_CAT => news::handle_new_news_cat(state, origin, tx),
        TRAN_NEW_NEWS_FLDR => news::handle_new_news_fldr(state, origin, tx),
        TRAN_POST_NEWS_ART => news::handle_post_news_art(state, origin, tx),
        TRAN_DEL_NEWS_ART => news::handle_del_news_art(state, origin, tx),
        TRAN_DEL_NEWS_ITEM => news::handle_del_news_item(state, origin, tx),

        unknown => {
            logging::debug!(state.log, "unsupported transaction"; "type" => unknown, "client_id" => origin);
            Err(HandlerError::new(ERR_UNSUPPORTED))
        }
    };

    match result {
        Ok(outbound) => outbound,
        Err(HandlerError(message)) => vec![Outbound::Reply(Transaction::error_reply(&message))],
    }
}
