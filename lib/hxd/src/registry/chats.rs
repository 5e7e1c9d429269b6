//! Private-chat registry. Chat id zero is the implicit public chat and is
//! never allocated.

use hashbrown::{HashMap, HashSet};
use rand::Rng;

pub const PUBLIC_CHAT_ID: u32 = 0;

#[derive(Debug, Clone)]
pub struct Chat {
    pub id: u32,
    members: Vec<u16>,
    invited: HashSet<u16>,
    subject: Vec<u8>,
}

impl Chat {
    fn new(id: u32, initial_member: u16) -> Chat {
        let mut invited = HashSet::new();
        invited.insert(initial_member);
        Chat {
            id,
            members: vec![initial_member],
            invited,
            subject: Vec::new(),
        }
    }

    #[inline]
    pub fn has_member(&self, conn_id: u16) -> bool {
        self.members.contains(&conn_id)
    }

    /// A chat is addressable only by clients that were invited into it (or
    /// created it). Empty chats may linger but stay invisible to strangers.
    #[inline]
    pub fn is_invited(&self, conn_id: u16) -> bool {
        self.invited.contains(&conn_id)
    }
}

pub struct Chats {
    chats: HashMap<u32, Chat>,
}

impl Chats {
    pub fn new() -> Chats {
        Chats { chats: HashMap::new() }
    }

    /// Create a chat with a random non-zero id, collision-checked against
    /// live chats.
    pub fn new_chat(&mut self, initial_member: u16) -> u32 {
        let mut rng = rand::thread_rng();
        loop {
            let id: u32 = rng.gen();
            if id != PUBLIC_CHAT_ID && !self.chats.contains_key(&id) {
                self.chats.insert(id, Chat::new(id, initial_member));
                return id;
            }
        }
    }

    pub fn get(&self, chat_id: u32) -> Option<&Chat> {
        self.chats.get(&chat_id)
    }

    /// Record an invitation so the target may later join.
    pub fn invite(&mut self, chat_id: u32, conn_id: u16) -> bool {
        match self.chats.get_mut(&chat_id) {
            Some(chat) => {
                chat.invited.insert(conn_id);
                true
            }
            None => false,
        }
    }

    /// Join an invited connection. Returns false for unknown chats and for
    /// gate-crashers.
    pub fn join(&mut self, chat_id: u32, conn_id: u16) -> bool {
        match self.chats.get_mut(&chat_id) {
            Some(chat) if chat.is_invited(conn_id) => {
                if !chat.members.contains(&conn_id) {
                    chat.members.push(conn_id);
                }
                true
            }
            _ => false,
        }
    }

    /// Remove a member; the chat itself is dropped once empty.
    pub fn leave(&mut self, chat_id: u32, conn_id: u16) {
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.members.retain(|&id| id != conn_id);
            if chat.members.is_empty() {
                self.chats.remove(&chat_id);
            }
        }
    }

    /// Membership snapshot in join order.
    pub fn members(&self, chat_id: u32) -> Vec<u16> {
        self.chats
            .get(&chat_id)
            .map(|chat| chat.members.clone())
            .unwrap_or_default()
    }

    pub fn set_subject(&mut self, chat_id: u32, subject: Vec<u8>) {
        if let Some(chat) = self.chats.get_mut(&chat_id) {
            chat.subject = subject;
        }
    }

    pub fn subject(&self, chat_id: u32) -> Vec<u8> {
        self.chats
            .get(&chat_id)
            .map(|chat| chat.subject.clone())
            .unwrap_or_default()
    }

    /// Drop a disconnecting client from every chat. Returns the ids of the
    /// chats it actually belonged to so the caller can notify the remaining
    /// members.
    pub fn remove_conn(&mut self, conn_id: u16) -> Vec<u32> {
        let affected: Vec<u32> = self
            .chats
            .values()
            .filter(|chat| chat.has_member(conn_id))
            .map(|chat| chat.id)
            .collect();

        for &chat_id in &affected {
            self.leave(chat_id, conn_id);
        }

        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chat_id_never_zero() {
        let mut chats = Chats::new();
        for _ in 0..64 {
            let id = chats.new_chat(1);
            assert_ne!(id, PUBLIC_CHAT_ID);
        }
    }

    #[test]
    fn test_join_requires_invite() {
        let mut chats = Chats::new();
        let id = chats.new_chat(1);

        assert!(!chats.join(id, 2), "uninvited client joined");

        chats.invite(id, 2);
        assert!(chats.join(id, 2));
        assert_eq!(chats.members(id), vec![1, 2]);
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut chats = Chats::new();
        let id = chats.new_chat(1);
        chats.invite(id, 2);

        chats.join(id, 2);
        chats.join(id, 2);

        assert_eq!(chats.members(id), vec![1, 2]);
    }

    #[test]
    fn test_leave_drops_empty_chat() {
        let mut chats = Chats::new();
        let id = chats.new_chat(1);

        chats.leave(id, 1);

        assert!(chats.get(id).is_none());
    }

    #[test]
    fn test_subject() {
        let mut chats = Chats::new();
        let id = chats.new_chat(1);

        chats.set_subject(id, b"plans".to_vec());
        assert_eq!(chats.subject(id), b"plans".to_vec());
        assert_eq!(chats.subject(0xDEAD_0001), Vec::<u8>::new());
    }

    #[test]
    fn test_remove_conn_reports_memberships() {
        let mut chats = Chats::new();
        let a = chats.new_chat(1);
        let b = chats.new_chat(2);
        chats.invite(b, 1);
        chats.join(b, 1);

        let mut affected = chats.remove_conn(1);
        affected.sort_unstable();

        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(affected, expected);

        // Chat a is gone (empty); chat b retains member 2.
        assert!(chats.get(a).is_none());
        assert_eq!(chats.members(b), vec![2]);
    }
}
