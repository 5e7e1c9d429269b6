//! Threaded news: a tree of Bundles and Categories, with articles linked
//! both in post order (prev/next) and as a reply tree (parent/first child).
//!
//! Articles reference their neighbors by id, never by pointer; the whole
//! tree is one JSON document written atomically.

use crate::logging::{self, Logger};
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

pub const TYPE_BUNDLE: u16 = 0x0002;
pub const TYPE_CATEGORY: u16 = 0x0003;

pub const DEFAULT_FLAVOR: &str = "text/plain";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: u32,
    pub parent: u32,
    pub prev: u32,
    pub next: u32,
    pub first_child: u32,
    pub title: String,
    pub poster: String,
    pub date: DateTime<Utc>,
    pub flavor: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsNode {
    pub kind: u16,
    pub name: String,
    #[serde(default)]
    pub articles: BTreeMap<u32, Article>,
    #[serde(default)]
    pub children: BTreeMap<String, NewsNode>,
}

impl NewsNode {
    fn bundle(name: &str) -> NewsNode {
        NewsNode {
            kind: TYPE_BUNDLE,
            name: name.to_string(),
            articles: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    fn category(name: &str) -> NewsNode {
        NewsNode {
            kind: TYPE_CATEGORY,
            name: name.to_string(),
            articles: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    /// Highest article id ever used in this category; ids are monotonic
    /// within a category and start at 1.
    fn max_article_id(&self) -> u32 {
        self.articles.keys().next_back().copied().unwrap_or(0)
    }
}

pub struct ThreadedNews {
    path: PathBuf,
    root: NewsNode,
    log: Logger,
}

impl ThreadedNews {
    pub fn open<'a, L: Into<Option<&'a Logger>>>(path: PathBuf, log: L) -> io::Result<ThreadedNews> {
        let root = if path.exists() {
            let file = fs::File::open(&path)?;
            serde_json::from_reader(file).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
        } else {
            NewsNode::bundle("")
        };

        Ok(ThreadedNews {
            path,
            root,
            log: logging::child(log),
        })
    }

    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        let file = fs::File::create(&tmp)?;
        serde_json::to_writer(file, &self.root)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        fs::rename(&tmp, &self.path)
    }

    fn node(&self, path: &[String]) -> Option<&NewsNode> {
        let mut node = &self.root;
        for segment in path {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &[String]) -> Option<&mut NewsNode> {
        let mut node = &mut self.root;
        for segment in path {
            node = node.children.get_mut(segment)?;
        }
        Some(node)
    }

    /// Immediate children at `path`, in name order.
    pub fn list(&self, path: &[String]) -> Option<Vec<NewsNode>> {
        self.node(path).map(|node| node.children.values().cloned().collect())
    }

    /// The node itself, for `GetNewsCatNameList` on a leaf.
    pub fn item(&self, path: &[String]) -> Option<NewsNode> {
        self.node(path).cloned()
    }

    pub fn create_grouping(&mut self, path: &[String], name: &str, kind: u16) -> io::Result<()> {
        let node = self
            .node_mut(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such news path"))?;

        if node.kind != TYPE_BUNDLE {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "categories cannot nest"));
        }
        if node.children.contains_key(name) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "name in use"));
        }

        let child = match kind {
            TYPE_BUNDLE => NewsNode::bundle(name),
            TYPE_CATEGORY => NewsNode::category(name),
            _ => return Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown grouping kind")),
        };
        node.children.insert(name.to_string(), child);

        logging::debug!(self.log, "news grouping created"; "name" => name, "kind" => kind);
        self.save()
    }

    /// Delete a bundle or category, everything below included.
    pub fn delete_item(&mut self, path: &[String]) -> io::Result<()> {
        let (leaf, parent_path) = match path.split_last() {
            Some(split) => split,
            None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot delete root")),
        };

        let parent = self
            .node_mut(parent_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such news path"))?;
        if parent.children.remove(leaf).is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such news item"));
        }
        self.save()
    }

    /// Articles of the category at `path`, in post (id) order.
    pub fn list_articles(&self, path: &[String]) -> Option<Vec<Article>> {
        self.node(path)
            .filter(|node| node.kind == TYPE_CATEGORY)
            .map(|node| node.articles.values().cloned().collect())
    }

    pub fn article(&self, path: &[String], id: u32) -> Option<Article> {
        self.node(path)?.articles.get(&id).cloned()
    }

    /// Post an article. The new id is the category's max + 1 (from 1); the
    /// previous newest article is linked forward to it, and a first reply
    /// claims its parent's `first_child` slot.
    pub fn post_article(
        &mut self,
        path: &[String],
        parent_id: u32,
        title: &str,
        poster: &str,
        flavor: &str,
        data: Vec<u8>,
    ) -> io::Result<u32> {
        let node = self
            .node_mut(path)
            .filter(|node| node.kind == TYPE_CATEGORY)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such category"))?;

        if parent_id != 0 && !node.articles.contains_key(&parent_id) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such parent article"));
        }

        let prev_id = node.max_article_id();
        let id = prev_id + 1;

        if let Some(prev) = node.articles.get_mut(&prev_id) {
            prev.next = id;
        }
        if parent_id != 0 {
            let parent = node.articles.get_mut(&parent_id).expect("parent checked above");
            if parent.first_child == 0 {
                parent.first_child = id;
            }
        }

        node.articles.insert(
            id,
            Article {
                id,
                parent: parent_id,
                prev: prev_id,
                next: 0,
                first_child: 0,
                title: title.to_string(),
                poster: poster.to_string(),
                date: Utc::now(),
                flavor: flavor.to_string(),
                data,
            },
        );

        logging::debug!(self.log, "article posted"; "id" => id, "parent" => parent_id);
        self.save()?;
        Ok(id)
    }

    /// Delete an article. Replies block deletion unless `recursive`.
    pub fn delete_article(&mut self, path: &[String], id: u32, recursive: bool) -> io::Result<()> {
        let node = self
            .node_mut(path)
            .filter(|node| node.kind == TYPE_CATEGORY)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such category"))?;

        if !node.articles.contains_key(&id) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such article"));
        }

        let children: Vec<u32> = node
            .articles
            .values()
            .filter(|art| art.parent == id)
            .map(|art| art.id)
            .collect();
        if !children.is_empty() && !recursive {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "article has replies"));
        }

        let mut doomed = vec![id];
        let mut queue = children;
        while let Some(child) = queue.pop() {
            queue.extend(
                node.articles
                    .values()
                    .filter(|art| art.parent == child)
                    .map(|art| art.id),
            );
            doomed.push(child);
        }

        for dead in &doomed {
            let removed = node.articles.remove(dead).expect("doomed ids exist");
            // Stitch the post-order chain around the removed article.
            if let Some(prev) = node.articles.get_mut(&removed.prev) {
                prev.next = removed.next;
            }
            if let Some(next) = node.articles.get_mut(&removed.next) {
                next.prev = removed.prev;
            }
            // A deleted first child hands the slot to the oldest surviving
            // sibling; clients walk replies from firstChildArt, so a zero
            // here would strand the rest of the thread.
            if removed.parent != 0 {
                let successor = node
                    .articles
                    .values()
                    .filter(|art| art.parent == removed.parent)
                    .map(|art| art.id)
                    .min()
                    .unwrap_or(0);
                if let Some(parent) = node.articles.get_mut(&removed.parent) {
                    if parent.first_child == *dead {
                        parent.first_child = successor;
                    }
                }
            }
        }

        self.save()
    }
}
