//! The numeric vocabulary of the protocol: transaction types and field ids.
//!
//! Both registries are append-only. The values are parsed by clients that
//! have not been updated since the early 2000s, so nothing here may be
//! renumbered.

// Transaction types.
pub const TRAN_ERROR: u16 = 100;
pub const TRAN_GET_MSGS: u16 = 101;
pub const TRAN_NEW_MSG: u16 = 102;
pub const TRAN_OLD_POST_NEWS: u16 = 103;
pub const TRAN_SERVER_MSG: u16 = 104;
pub const TRAN_CHAT_SEND: u16 = 105;
pub const TRAN_CHAT_MSG: u16 = 106;
pub const TRAN_LOGIN: u16 = 107;
pub const TRAN_SEND_INSTANT_MSG: u16 = 108;
pub const TRAN_SHOW_AGREEMENT: u16 = 109;
pub const TRAN_DISCONNECT_USER: u16 = 110;
pub const TRAN_DISCONNECT_MSG: u16 = 111;
pub const TRAN_INVITE_NEW_CHAT: u16 = 112;
pub const TRAN_INVITE_TO_CHAT: u16 = 113;
pub const TRAN_REJECT_CHAT_INVITE: u16 = 114;
pub const TRAN_JOIN_CHAT: u16 = 115;
pub const TRAN_LEAVE_CHAT: u16 = 116;
pub const TRAN_NOTIFY_CHAT_CHANGE_USER: u16 = 117;
pub const TRAN_NOTIFY_CHAT_DELETE_USER: u16 = 118;
pub const TRAN_NOTIFY_CHAT_SUBJECT: u16 = 119;
pub const TRAN_SET_CHAT_SUBJECT: u16 = 120;
pub const TRAN_AGREED: u16 = 121;
pub const TRAN_SERVER_BANNER: u16 = 122;
pub const TRAN_GET_FILE_NAME_LIST: u16 = 200;
pub const TRAN_DOWNLOAD_FILE: u16 = 202;
pub const TRAN_UPLOAD_FILE: u16 = 203;
pub const TRAN_DELETE_FILE: u16 = 204;
pub const TRAN_NEW_FOLDER: u16 = 205;
pub const TRAN_GET_FILE_INFO: u16 = 206;
pub const TRAN_SET_FILE_INFO: u16 = 207;
pub const TRAN_MOVE_FILE: u16 = 208;
pub const TRAN_MAKE_FILE_ALIAS: u16 = 209;
pub const TRAN_DOWNLOAD_FLDR: u16 = 210;
pub const TRAN_DOWNLOAD_INFO: u16 = 211;
pub const TRAN_DOWNLOAD_BANNER: u16 = 212;
pub const TRAN_UPLOAD_FLDR: u16 = 213;
pub const TRAN_GET_USER_NAME_LIST: u16 = 300;
pub const TRAN_NOTIFY_CHANGE_USER: u16 = 301;
pub const TRAN_NOTIFY_DELETE_USER: u16 = 302;
pub const TRAN_GET_CLIENT_INFO_TEXT: u16 = 303;
pub const TRAN_SET_CLIENT_USER_INFO: u16 = 304;
pub const TRAN_LIST_USERS: u16 = 348;
pub const TRAN_UPDATE_USER: u16 = 349;
pub const TRAN_NEW_USER: u16 = 350;
pub const TRAN_DELETE_USER: u16 = 351;
pub const TRAN_GET_USER: u16 = 352;
pub const TRAN_SET_USER: u16 = 353;
pub const TRAN_USER_ACCESS: u16 = 354;
pub const TRAN_USER_BROADCAST: u16 = 355;
pub const TRAN_GET_NEWS_CAT_NAME_LIST: u16 = 370;
pub const TRAN_GET_NEWS_ART_NAME_LIST: u16 = 371;
pub const TRAN_DEL_NEWS_ITEM: u16 = 380;
pub const TRAN_NEW_NEWS_FLDR: u16 = 381;
pub const TRAN_NEW_NEWS_CAT: u16 = 382;
pub const TRAN_GET_NEWS_ART_DATA: u16 = 400;
pub const TRAN_POST_NEWS_ART: u16 = 410;
pub const TRAN_DEL_NEWS_ART: u16 = 411;
pub const TRAN_KEEP_ALIVE: u16 = 500;

// Field ids.
pub const FIELD_ERROR: u16 = 100;
pub const FIELD_DATA: u16 = 101;
pub const FIELD_USER_NAME: u16 = 102;
pub const FIELD_USER_ID: u16 = 103;
pub const FIELD_USER_ICON_ID: u16 = 104;
pub const FIELD_USER_LOGIN: u16 = 105;
pub const FIELD_USER_PASSWORD: u16 = 106;
pub const FIELD_REF_NUM: u16 = 107;
pub const FIELD_TRANSFER_SIZE: u16 = 108;
pub const FIELD_CHAT_OPTIONS: u16 = 109;
pub const FIELD_USER_ACCESS: u16 = 110;
pub const FIELD_USER_ALIAS: u16 = 111;
pub const FIELD_USER_FLAGS: u16 = 112;
pub const FIELD_OPTIONS: u16 = 113;
pub const FIELD_CHAT_ID: u16 = 114;
pub const FIELD_CHAT_SUBJECT: u16 = 115;
pub const FIELD_WAITING_COUNT: u16 = 116;
pub const FIELD_SERVER_AGREEMENT: u16 = 150;
pub const FIELD_SERVER_BANNER: u16 = 151;
pub const FIELD_SERVER_BANNER_TYPE: u16 = 152;
pub const FIELD_SERVER_BANNER_URL: u16 = 153;
pub const FIELD_NO_SERVER_AGREEMENT: u16 = 154;
pub const FIELD_VERSION: u16 = 160;
pub const FIELD_COMMUNITY_BANNER_ID: u16 = 161;
pub const FIELD_SERVER_NAME: u16 = 162;
pub const FIELD_FILE_NAME_WITH_INFO: u16 = 200;
pub const FIELD_FILE_NAME: u16 = 201;
pub const FIELD_FILE_PATH: u16 = 202;
pub const FIELD_FILE_RESUME_DATA: u16 = 203;
pub const FIELD_FILE_TRANSFER_OPTIONS: u16 = 204;
pub const FIELD_FILE_TYPE_STRING: u16 = 205;
pub const FIELD_FILE_CREATOR_STRING: u16 = 206;
pub const FIELD_FILE_SIZE: u16 = 207;
pub const FIELD_FILE_CREATE_DATE: u16 = 208;
pub const FIELD_FILE_MODIFY_DATE: u16 = 209;
pub const FIELD_FILE_COMMENT: u16 = 210;
pub const FIELD_FILE_NEW_NAME: u16 = 211;
pub const FIELD_FILE_NEW_PATH: u16 = 212;
pub const FIELD_FILE_TYPE: u16 = 213;
pub const FIELD_QUOTING_MSG: u16 = 214;
pub const FIELD_AUTOMATIC_RESPONSE: u16 = 215;
pub const FIELD_FOLDER_ITEM_COUNT: u16 = 220;
pub const FIELD_USER_NAME_WITH_INFO: u16 = 300;
pub const FIELD_NEWS_ART_LIST_DATA: u16 = 321;
pub const FIELD_NEWS_CAT_NAME: u16 = 322;
pub const FIELD_NEWS_CAT_LIST_DATA: u16 = 323;
pub const FIELD_NEWS_PATH: u16 = 325;
pub const FIELD_NEWS_ART_ID: u16 = 326;
pub const FIELD_NEWS_ART_DATA_FLAV: u16 = 327;
pub const FIELD_NEWS_ART_TITLE: u16 = 328;
pub const FIELD_NEWS_ART_POSTER: u16 = 329;
pub const FIELD_NEWS_ART_DATE: u16 = 330;
pub const FIELD_NEWS_ART_PREV_ART: u16 = 331;
pub const FIELD_NEWS_ART_NEXT_ART: u16 = 332;
pub const FIELD_NEWS_ART_DATA: u16 = 333;
pub const FIELD_NEWS_ART_FLAGS: u16 = 334;
pub const FIELD_NEWS_ART_PARENT_ART: u16 = 335;
pub const FIELD_NEWS_ART_FIRST_CHILD_ART: u16 = 336;
pub const FIELD_NEWS_ART_RECURSE_DEL: u16 = 337;

// Client flag bits within the 2-byte user flags bitmap, counted from the
// least significant bit.
pub const USER_FLAG_AWAY: u16 = 0x0001;
pub const USER_FLAG_ADMIN: u16 = 0x0002;
pub const USER_FLAG_REFUSE_PM: u16 = 0x0004;
pub const USER_FLAG_REFUSE_CHAT: u16 = 0x0008;

// Chat option signalling an emote-style message.
pub const CHAT_OPTION_EMOTE: u16 = 0x0001;
