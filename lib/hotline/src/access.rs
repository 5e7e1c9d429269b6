//! The fixed 64-bit permission bitmap attached to every account.
//!
//! Bit indices are counted from the most significant bit of byte 0 and form
//! an append-only registry; reordering would silently change the meaning of
//! every persisted account.

use serde_derive::{Deserialize, Serialize};

pub const DELETE_FILE: u8 = 0;
pub const UPLOAD_FILE: u8 = 1;
pub const DOWNLOAD_FILE: u8 = 2;
pub const RENAME_FILE: u8 = 3;
pub const MOVE_FILE: u8 = 4;
pub const CREATE_FOLDER: u8 = 5;
pub const DELETE_FOLDER: u8 = 6;
pub const RENAME_FOLDER: u8 = 7;
pub const MOVE_FOLDER: u8 = 8;
pub const READ_CHAT: u8 = 9;
pub const SEND_CHAT: u8 = 10;
pub const OPEN_CHAT: u8 = 11;
pub const CLOSE_CHAT: u8 = 12;
pub const SHOW_IN_LIST: u8 = 13;
pub const CREATE_USER: u8 = 14;
pub const DELETE_USER: u8 = 15;
pub const OPEN_USER: u8 = 16;
pub const MODIFY_USER: u8 = 17;
pub const CHANGE_OWN_PASS: u8 = 18;
pub const SEND_PRIV_MSG: u8 = 19;
pub const NEWS_READ_ART: u8 = 20;
pub const NEWS_POST_ART: u8 = 21;
pub const DISCONNECT_USER: u8 = 22;
pub const CANNOT_BE_DISCONNECTED: u8 = 23;
pub const GET_CLIENT_INFO: u8 = 24;
pub const UPLOAD_ANYWHERE: u8 = 25;
pub const ANY_NAME: u8 = 26;
pub const NO_AGREEMENT: u8 = 27;
pub const SET_FILE_COMMENT: u8 = 28;
pub const SET_FOLDER_COMMENT: u8 = 29;
pub const VIEW_DROP_BOXES: u8 = 30;
pub const MAKE_ALIAS: u8 = 31;
pub const BROADCAST: u8 = 32;
pub const NEWS_DELETE_ART: u8 = 33;
pub const NEWS_CREATE_CAT: u8 = 34;
pub const NEWS_DELETE_CAT: u8 = 35;
pub const NEWS_CREATE_FLDR: u8 = 36;
pub const NEWS_DELETE_FLDR: u8 = 37;
pub const UPLOAD_FOLDER: u8 = 38;
pub const DOWNLOAD_FOLDER: u8 = 39;

/// Eight bytes of permission bits, stored big-endian as they travel on the
/// wire in the `UserAccess` field.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessBitmap(pub [u8; 8]);

impl AccessBitmap {
    pub const BITS: u8 = 64;

    #[inline]
    pub fn new(bytes: [u8; 8]) -> AccessBitmap {
        AccessBitmap(bytes)
    }

    /// Bitmap with every bit set; the conventional admin account access.
    #[inline]
    pub fn full() -> AccessBitmap {
        AccessBitmap([0xFF; 8])
    }

    #[inline]
    pub fn is_set(&self, bit: u8) -> bool {
        debug_assert!(bit < Self::BITS);
        self.0[usize::from(bit / 8)] & (0x80 >> (bit % 8)) != 0
    }

    #[inline]
    pub fn set(&mut self, bit: u8, value: bool) {
        debug_assert!(bit < Self::BITS);
        let mask = 0x80 >> (bit % 8);
        if value {
            self.0[usize::from(bit / 8)] |= mask;
        } else {
            self.0[usize::from(bit / 8)] &= !mask;
        }
    }

    #[inline]
    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// True if every bit set in `other` is also set in `self`. Used to stop
    /// operators from granting permissions they do not hold themselves.
    pub fn covers(&self, other: &AccessBitmap) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(mine, theirs)| mine & theirs == *theirs)
    }
}

impl From<&[u8]> for AccessBitmap {
    /// Tolerates short payloads from older clients by zero-filling the tail.
    fn from(data: &[u8]) -> AccessBitmap {
        let mut bytes = [0u8; 8];
        let take = data.len().min(8);
        bytes[..take].copy_from_slice(&data[..take]);
        AccessBitmap(bytes)
    }
}
