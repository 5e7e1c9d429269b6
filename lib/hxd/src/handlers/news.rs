//! Flat message-board and threaded-news handlers.

use super::*;
use crate::error::{HandlerError, HandlerResult};
use crate::news::threaded::{Article, DEFAULT_FLAVOR};
use crate::news::{flat, TYPE_BUNDLE, TYPE_CATEGORY};
use crate::state::ServerState;
use chrono::Utc;
use hotline::access;
use hotline::date::encode_date;
use hotline::macroman;
use hotline::path::decode_path;
use hotline::transaction::Transaction;
use hotline::types::*;
use hotline::Field;
use std::io::Write;

fn news_path(tx: &Transaction) -> HandlerResult<Vec<String>> {
    let segments = decode_path(tx.field_bytes(FIELD_NEWS_PATH)).map_err(|_| HandlerError::new(ERR_NEWS_PATH))?;
    Ok(segments.iter().map(|segment| macroman::to_utf8(segment)).collect())
}

/// `TranGetMsgs`: the whole flat board in one data field.
pub fn handle_get_msgs(state: &ServerState, origin: u16, _tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_READ_ART, DENY_READ_NEWS)?;

    let contents = state
        .flat_news
        .lock()
        .unwrap()
        .contents()
        .map_err(|_| HandlerError::new(ERR_NEWS_PATH))?;

    Ok(vec![Outbound::reply(vec![Field::new(FIELD_DATA, contents)])])
}

/// Fill the configured template with poster, timestamp and body.
pub fn format_flat_post(template: &str, poster: &str, body: &[u8]) -> Vec<u8> {
    let timestamp = Utc::now().format("%b %e %H:%M").to_string();
    let filled = template
        .replacen("%s", poster, 1)
        .replacen("%s", &timestamp, 1)
        .replacen("%s", &macroman::to_utf8(body), 1);

    let mut post = flat::normalize_newlines(filled.as_bytes());
    post.push(b'\r');
    post
}

/// `TranOldPostNews`: prepend to the board and poke every client.
pub fn handle_old_post_news(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_POST_ART, DENY_POST_NEWS)?;

    let body = flat::normalize_newlines(tx.field_bytes(FIELD_DATA));
    let poster = macroman::to_utf8(&conn.user_name);
    let post = format_flat_post(&state.config.news.template, &poster, &body);

    state
        .flat_news
        .lock()
        .unwrap()
        .write(&post)
        .map_err(|_| HandlerError::new("Unable to save the message board."))?;

    let mut out = vec![Outbound::ok()];
    let poke = Transaction::new(TRAN_NEW_MSG, Vec::new());
    out.extend(state.conn_list().into_iter().filter_map(|other| {
        let other = other.lock().unwrap();
        if other.joined {
            Some(Outbound::Notify(other.id, poke.clone()))
        } else {
            None
        }
    }));
    Ok(out)
}

/// One `NewsCatListData` payload: `{type(2) count(2) nameLen(1) name}`.
pub fn encode_cat_list_entry(kind: u16, count: u16, name: &str) -> Vec<u8> {
    let name = macroman::from_utf8(name);
    let mut buf = Vec::with_capacity(5 + name.len());
    buf.extend_from_slice(&kind.to_be_bytes());
    buf.extend_from_slice(&count.to_be_bytes());
    buf.push(name.len().min(255) as u8);
    buf.extend_from_slice(&name[..name.len().min(255)]);
    buf
}

/// `TranGetNewsCatNameList`: children of a bundle (or the root).
pub fn handle_get_news_cat_name_list(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_READ_ART, DENY_READ_NEWS)?;

    let path = news_path(tx)?;
    let children = state
        .threaded_news
        .lock()
        .unwrap()
        .list(&path)
        .ok_or_else(|| HandlerError::new(ERR_NEWS_PATH))?;

    let fields = children
        .iter()
        .map(|node| {
            let count = if node.kind == TYPE_CATEGORY {
                node.articles.len() as u16
            } else {
                node.children.len() as u16
            };
            Field::new(FIELD_NEWS_CAT_LIST_DATA, encode_cat_list_entry(node.kind, count, &node.name))
        })
        .collect();

    Ok(vec![Outbound::reply(fields)])
}

fn push_pstring(buf: &mut Vec<u8>, data: &[u8]) {
    let take = data.len().min(255);
    buf.push(take as u8);
    buf.extend_from_slice(&data[..take]);
}

/// The `NewsArtListData` payload: a 4-byte reserved word, the article
/// count, then one record per article in post order.
pub fn encode_art_list(articles: &[Article]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&(articles.len() as u32).to_be_bytes());

    for article in articles {
        buf.extend_from_slice(&article.id.to_be_bytes());
        buf.extend_from_slice(&encode_date(article.date));
        buf.extend_from_slice(&article.parent.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&1u16.to_be_bytes());
        push_pstring(&mut buf, &macroman::from_utf8(&article.title));
        push_pstring(&mut buf, &macroman::from_utf8(&article.poster));
        push_pstring(&mut buf, article.flavor.as_bytes());
        buf.extend_from_slice(&(article.data.len().min(65535) as u16).to_be_bytes());
    }

    buf
}

/// `TranGetNewsArtNameList`: the article index of one category.
pub fn handle_get_news_art_name_list(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_READ_ART, DENY_READ_NEWS)?;

    let path = news_path(tx)?;
    let articles = state
        .threaded_news
        .lock()
        .unwrap()
        .list_articles(&path)
        .ok_or_else(|| HandlerError::new(ERR_NEWS_PATH))?;

    Ok(vec![Outbound::reply(vec![Field::new(
        FIELD_NEWS_ART_LIST_DATA,
        encode_art_list(&articles),
    )])])
}

/// `TranGetNewsArtData`: one article with all its linkage.
pub fn handle_get_news_art_data(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_READ_ART, DENY_READ_NEWS)?;

    let path = news_path(tx)?;
    let id = tx.field_int(FIELD_NEWS_ART_ID).unwrap_or(0);

    let article = state
        .threaded_news
        .lock()
        .unwrap()
        .article(&path, id)
        .ok_or_else(|| HandlerError::new(ERR_ARTICLE_NOT_FOUND))?;

    Ok(vec![Outbound::reply(vec![
        Field::new(FIELD_NEWS_ART_TITLE, macroman::from_utf8(&article.title)),
        Field::new(FIELD_NEWS_ART_POSTER, macroman::from_utf8(&article.poster)),
        Field::new(FIELD_NEWS_ART_DATE, encode_date(article.date).to_vec()),
        Field::with_u32(FIELD_NEWS_ART_PREV_ART, article.prev),
        Field::with_u32(FIELD_NEWS_ART_NEXT_ART, article.next),
        Field::with_u32(FIELD_NEWS_ART_PARENT_ART, article.parent),
        Field::with_u32(FIELD_NEWS_ART_FIRST_CHILD_ART, article.first_child),
        Field::with_str(FIELD_NEWS_ART_DATA_FLAV, &article.flavor),
        Field::new(FIELD_NEWS_ART_DATA, article.data),
    ])])
}

/// `TranNewNewsCat`: create a category under a bundle.
pub fn handle_new_news_cat(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_CREATE_CAT, DENY_CREATE_NEWS_CAT)?;

    let path = news_path(tx)?;
    let name = macroman::to_utf8(tx.field_bytes(FIELD_NEWS_CAT_NAME));

    state
        .threaded_news
        .lock()
        .unwrap()
        .create_grouping(&path, &name, TYPE_CATEGORY)
        .map_err(|_| HandlerError::new(ERR_NEWS_PATH))?;
    Ok(vec![Outbound::ok()])
}

/// `TranNewNewsFldr`: create a bundle. The name rides in the file-name
/// field, a quirk the clients share.
pub fn handle_new_news_fldr(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_CREATE_FLDR, DENY_CREATE_NEWS_FLDR)?;

    let path = news_path(tx)?;
    let name = macroman::to_utf8(tx.field_bytes(FIELD_FILE_NAME));

    state
        .threaded_news
        .lock()
        .unwrap()
        .create_grouping(&path, &name, TYPE_BUNDLE)
        .map_err(|_| HandlerError::new(ERR_NEWS_PATH))?;
    Ok(vec![Outbound::ok()])
}

/// `TranDelNewsItem`: delete a bundle or category, permission chosen by
/// what the path points at.
pub fn handle_del_news_item(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    let path = news_path(tx)?;

    let item = state
        .threaded_news
        .lock()
        .unwrap()
        .item(&path)
        .ok_or_else(|| HandlerError::new(ERR_NEWS_PATH))?;

    if item.kind == TYPE_CATEGORY {
        require(&conn, access::NEWS_DELETE_CAT, DENY_DELETE_NEWS_CAT)?;
    } else {
        require(&conn, access::NEWS_DELETE_FLDR, DENY_DELETE_NEWS_FLDR)?;
    }

    state
        .threaded_news
        .lock()
        .unwrap()
        .delete_item(&path)
        .map_err(|_| HandlerError::new(ERR_NEWS_PATH))?;
    Ok(vec![Outbound::ok()])
}

/// `TranPostNewsArt`: post into a category, optionally as a reply.
pub fn handle_post_news_art(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_POST_ART, DENY_POST_NEWS)?;

    let path = news_path(tx)?;
    let parent = tx.field_int(FIELD_NEWS_ART_PARENT_ART).unwrap_or(0);
    let title = macroman::to_utf8(tx.field_bytes(FIELD_NEWS_ART_TITLE));
    let poster = macroman::to_utf8(&conn.user_name);
    let flavor = tx
        .get_field(FIELD_NEWS_ART_DATA_FLAV)
        .map(|field| String::from_utf8_lossy(&field.data).into_owned())
        .unwrap_or_else(|| DEFAULT_FLAVOR.to_string());

    state
        .threaded_news
        .lock()
        .unwrap()
        .post_article(
            &path,
            parent,
            &title,
            &poster,
            &flavor,
            tx.field_bytes(FIELD_NEWS_ART_DATA).to_vec(),
        )
        .map_err(|_| HandlerError::new(ERR_NEWS_PATH))?;

    Ok(vec![Outbound::ok()])
}

/// `TranDelNewsArt`: delete an article, recursively when asked.
pub fn handle_del_news_art(state: &ServerState, origin: u16, tx: &Transaction) -> HandlerResult<Vec<Outbound>> {
    let conn = origin_conn(state, origin)?;
    require(&conn, access::NEWS_DELETE_ART, DENY_DELETE_NEWS_ART)?;

    let path = news_path(tx)?;
    let id = tx.field_int(FIELD_NEWS_ART_ID).unwrap_or(0);
    let recursive = tx.field_int(FIELD_NEWS_ART_RECURSE_DEL).unwrap_or(0) != 0;

    state
        .threaded_news
        .lock()
        .unwrap()
        .delete_article(&path, id, recursive)
        .map_err(|_| HandlerError::new(ERR_ARTICLE_NOT_FOUND))?;
    Ok(vec![Outbound::ok()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil;
    use hotline::access::AccessBitmap;
    use hotline::path::encode_path;

    fn news_path_field(segments: &[&str]) -> Field {
        let segments: Vec<Vec<u8>> = segments.iter().map(|s| s.as_bytes().to_vec()).collect();
        Field::new(FIELD_NEWS_PATH, encode_path(&segments).unwrap())
    }

    fn make_category(state: &ServerState, name: &str) {
        state
            .threaded_news
            .lock()
            .unwrap()
            .create_grouping(&[], name, TYPE_CATEGORY)
            .unwrap();
    }

    #[test]
    fn test_old_post_news_prepends_and_pokes() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");
        let bob = testutil::join_client(&state, "Bob");

        let tx = Transaction::new(
            TRAN_OLD_POST_NEWS,
            vec![Field::new(FIELD_DATA, b"first\nline".to_vec())],
        );
        let out = handle_old_post_news(&state, alice, &tx).unwrap();

        let board = state.flat_news.lock().unwrap().contents().unwrap();
        let board_text = String::from_utf8_lossy(&board);
        assert!(board_text.contains("Alice"));
        assert!(board_text.contains("first\rline"), "newlines not normalized: {:?}", board_text);
        assert!(!board_text.contains('\n'));

        assert_eq!(out[0], Outbound::ok());
        assert!(out.iter().any(|o| matches!(
            o,
            Outbound::Notify(target, tx) if *target == bob && tx.ty == TRAN_NEW_MSG && tx.fields.is_empty()
        )));
    }

    #[test]
    fn test_get_msgs_streams_board() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");
        state.flat_news.lock().unwrap().write(b"hello board\r").unwrap();

        let out = handle_get_msgs(&state, alice, &Transaction::new(TRAN_GET_MSGS, vec![])).unwrap();

        match &out[0] {
            Outbound::Reply(reply) => assert_eq!(reply.field_bytes(FIELD_DATA), b"hello board\r".as_ref()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_get_msgs_requires_read_permission() {
        let (_dir, state) = testutil::state();
        let nobody = testutil::join_client_with_access(&state, "Nobody", AccessBitmap::default());

        let err = handle_get_msgs(&state, nobody, &Transaction::new(TRAN_GET_MSGS, vec![])).unwrap_err();
        assert_eq!(err.0, DENY_READ_NEWS);
    }

    #[test]
    fn test_cat_name_list_entry_layout() {
        let entry = encode_cat_list_entry(TYPE_CATEGORY, 2, "General");
        assert_eq!(
            entry,
            vec![0x00, 0x03, 0x00, 0x02, 0x07, b'G', b'e', b'n', b'e', b'r', b'a', b'l']
        );
    }

    #[test]
    fn test_cat_name_list_counts() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");
        make_category(&state, "General");
        state
            .threaded_news
            .lock()
            .unwrap()
            .create_grouping(&[], "Archive", TYPE_BUNDLE)
            .unwrap();

        let tx = Transaction::new(TRAN_GET_NEWS_CAT_NAME_LIST, vec![]);
        let out = handle_get_news_cat_name_list(&state, alice, &tx).unwrap();

        match &out[0] {
            Outbound::Reply(reply) => {
                let entries: Vec<&Field> = reply.fields_with_id(FIELD_NEWS_CAT_LIST_DATA).collect();
                assert_eq!(entries.len(), 2);
                // Name-ordered: Archive (bundle) then General (category).
                assert_eq!(entries[0].data[..2], [0x00, 0x02]);
                assert_eq!(entries[1].data[..2], [0x00, 0x03]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_post_and_fetch_article() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");
        make_category(&state, "General");

        let post = Transaction::new(
            TRAN_POST_NEWS_ART,
            vec![
                news_path_field(&["General"]),
                Field::new(FIELD_NEWS_ART_TITLE, b"hello".to_vec()),
                Field::new(FIELD_NEWS_ART_DATA, b"body text".to_vec()),
            ],
        );
        handle_post_news_art(&state, alice, &post).unwrap();

        let get = Transaction::new(
            TRAN_GET_NEWS_ART_DATA,
            vec![news_path_field(&["General"]), Field::with_u32(FIELD_NEWS_ART_ID, 1)],
        );
        let out = handle_get_news_art_data(&state, alice, &get).unwrap();

        match &out[0] {
            Outbound::Reply(reply) => {
                assert_eq!(reply.field_bytes(FIELD_NEWS_ART_TITLE), b"hello".as_ref());
                assert_eq!(reply.field_bytes(FIELD_NEWS_ART_POSTER), b"Alice".as_ref());
                assert_eq!(reply.field_bytes(FIELD_NEWS_ART_DATA), b"body text".as_ref());
                assert_eq!(reply.field_int(FIELD_NEWS_ART_PARENT_ART), Some(0));
                assert_eq!(reply.field_bytes(FIELD_NEWS_ART_DATA_FLAV), b"text/plain".as_ref());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reply_updates_linkage_over_the_wire() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");
        make_category(&state, "General");

        for title in ["root", "second"].iter() {
            let post = Transaction::new(
                TRAN_POST_NEWS_ART,
                vec![
                    news_path_field(&["General"]),
                    Field::new(FIELD_NEWS_ART_TITLE, title.as_bytes().to_vec()),
                    Field::new(FIELD_NEWS_ART_DATA, b"x".to_vec()),
                ],
            );
            handle_post_news_art(&state, alice, &post).unwrap();
        }

        let reply_post = Transaction::new(
            TRAN_POST_NEWS_ART,
            vec![
                news_path_field(&["General"]),
                Field::new(FIELD_NEWS_ART_TITLE, b"re: root".to_vec()),
                Field::with_u32(FIELD_NEWS_ART_PARENT_ART, 1),
                Field::new(FIELD_NEWS_ART_DATA, b"y".to_vec()),
            ],
        );
        handle_post_news_art(&state, alice, &reply_post).unwrap();

        let get = |id: u32| {
            let tx = Transaction::new(
                TRAN_GET_NEWS_ART_DATA,
                vec![news_path_field(&["General"]), Field::with_u32(FIELD_NEWS_ART_ID, id)],
            );
            match handle_get_news_art_data(&state, alice, &tx).unwrap().remove(0) {
                Outbound::Reply(reply) => reply,
                other => panic!("unexpected {:?}", other),
            }
        };

        // id 3 is the reply; article 2's next points at it, article 1 got
        // its first child.
        assert_eq!(get(2).field_int(FIELD_NEWS_ART_NEXT_ART), Some(3));
        assert_eq!(get(1).field_int(FIELD_NEWS_ART_FIRST_CHILD_ART), Some(3));
        assert_eq!(get(3).field_int(FIELD_NEWS_ART_PREV_ART), Some(2));
    }

    #[test]
    fn test_art_name_list_shape() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");
        make_category(&state, "General");
        state
            .threaded_news
            .lock()
            .unwrap()
            .post_article(&["General".to_string()], 0, "hi", "Alice", DEFAULT_FLAVOR, b"abc".to_vec())
            .unwrap();

        let tx = Transaction::new(TRAN_GET_NEWS_ART_NAME_LIST, vec![news_path_field(&["General"])]);
        let out = handle_get_news_art_name_list(&state, alice, &tx).unwrap();

        match &out[0] {
            Outbound::Reply(reply) => {
                let data = reply.field_bytes(FIELD_NEWS_ART_LIST_DATA);
                // reserved + count.
                assert_eq!(&data[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
                // first record id.
                assert_eq!(&data[8..12], &[0, 0, 0, 1]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_groupings_and_delete_item_permissions() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");

        let new_fldr = Transaction::new(
            TRAN_NEW_NEWS_FLDR,
            vec![Field::new(FIELD_FILE_NAME, b"Archive".to_vec())],
        );
        handle_new_news_fldr(&state, alice, &new_fldr).unwrap();

        let new_cat = Transaction::new(
            TRAN_NEW_NEWS_CAT,
            vec![
                news_path_field(&["Archive"]),
                Field::new(FIELD_NEWS_CAT_NAME, b"Old".to_vec()),
            ],
        );
        handle_new_news_cat(&state, alice, &new_cat).unwrap();

        // Deleting the category requires the category bit.
        let mut no_cat_del = AccessBitmap::full();
        no_cat_del.set(access::NEWS_DELETE_CAT, false);
        let limited = testutil::join_client_with_access(&state, "Limited", no_cat_del);

        let del_cat = Transaction::new(TRAN_DEL_NEWS_ITEM, vec![news_path_field(&["Archive", "Old"])]);
        assert_eq!(
            handle_del_news_item(&state, limited, &del_cat).unwrap_err().0,
            DENY_DELETE_NEWS_CAT
        );

        handle_del_news_item(&state, alice, &del_cat).unwrap();
        let del_fldr = Transaction::new(TRAN_DEL_NEWS_ITEM, vec![news_path_field(&["Archive"])]);
        handle_del_news_item(&state, alice, &del_fldr).unwrap();

        assert!(state.threaded_news.lock().unwrap().item(&["Archive".to_string()]).is_none());
    }

    #[test]
    fn test_del_news_art_recursive_flag() {
        let (_dir, state) = testutil::state();
        let alice = testutil::join_client(&state, "Alice");
        make_category(&state, "General");

        let mut news = state.threaded_news.lock().unwrap();
        news.post_article(&["General".to_string()], 0, "root", "Alice", DEFAULT_FLAVOR, Vec::new())
            .unwrap();
        news.post_article(&["General".to_string()], 1, "child", "Alice", DEFAULT_FLAVOR, Vec::new())
            .unwrap();
        drop(news);

        let without_flag = Transaction::new(
            TRAN_DEL_NEWS_ART,
            vec![news_path_field(&["General"]), Field::with_u32(FIELD_NEWS_ART_ID, 1)],
        );
        assert!(handle_del_news_art(&state, alice, &without_flag).is_err());

        let with_flag = Transaction::new(
            TRAN_DEL_NEWS_ART,
            vec![
                news_path_field(&["General"]),
                Field::with_u32(FIELD_NEWS_ART_ID, 1),
                Field::with_u16(FIELD_NEWS_ART_RECURSE_DEL, 1),
            ],
        );
        handle_del_news_art(&state, alice, &with_flag).unwrap();

        assert!(state
            .threaded_news
            .lock()
            .unwrap()
            .list_articles(&["General".to_string()])
            .unwrap()
            .is_empty());
    }
}
