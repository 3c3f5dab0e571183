//! Resource tags and the graph from tags to dependent cache entries.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::QueryKey;

/// Kind of server resource a cached result depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Route,
    RouteStop,
    Driver,
    TodayTrips,
    RouteStats,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Route => "Route",
            TagKind::RouteStop => "RouteStop",
            TagKind::Driver => "Driver",
            TagKind::TodayTrips => "TodayTrips",
            TagKind::RouteStats => "RouteStats",
        }
    }
}

/// Identifier part of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagId {
    /// Bare tag covering every tag of its kind
    Whole,
    /// The collection listing of a kind
    List,
    Id(String),
}

/// A `(kind, id)` pair. Queries provide tags, mutations invalidate them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub kind: TagKind,
    pub id: TagId,
}

impl Tag {
    pub fn whole(kind: TagKind) -> Self {
        Self {
            kind,
            id: TagId::Whole,
        }
    }

    pub fn list(kind: TagKind) -> Self {
        Self {
            kind,
            id: TagId::List,
        }
    }

    pub fn id(kind: TagKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: TagId::Id(id.into()),
        }
    }

    /// Two tags match when kinds agree and either side is whole-kind or the ids are equal.
    pub fn matches(&self, other: &Tag) -> bool {
        self.kind == other.kind
            && (self.id == TagId::Whole || other.id == TagId::Whole || self.id == other.id)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            TagId::Whole => write!(f, "{}", self.kind.as_str()),
            TagId::List => write!(f, "{}:LIST", self.kind.as_str()),
            TagId::Id(id) => write!(f, "{}:{}", self.kind.as_str(), id),
        }
    }
}

/// Bidirectional index between tags and the query keys that provide them.
#[derive(Debug, Default)]
pub struct TagGraph {
    by_tag: HashMap<Tag, HashSet<QueryKey>>,
    by_key: HashMap<QueryKey, HashSet<Tag>>,
}

impl TagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tags a key depends on.
    pub fn register(&mut self, key: &QueryKey, tags: impl IntoIterator<Item = Tag>) {
        self.remove(key);
        let tags: HashSet<Tag> = tags.into_iter().collect();
        for tag in &tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.by_key.insert(key.clone(), tags);
    }

    pub fn remove(&mut self, key: &QueryKey) {
        let Some(tags) = self.by_key.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.by_tag.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(&tag);
                }
            }
        }
    }

    pub fn tags_of(&self, key: &QueryKey) -> Option<&HashSet<Tag>> {
        self.by_key.get(key)
    }

    /// Every key depending on at least one of the given tags.
    pub fn dependents<'a>(
        &self,
        invalidated: impl IntoIterator<Item = &'a Tag>,
    ) -> HashSet<QueryKey> {
        let mut keys = HashSet::new();
        for tag in invalidated {
            if tag.id == TagId::Whole {
                for (provided, dependents) in &self.by_tag {
                    if provided.kind == tag.kind {
                        keys.extend(dependents.iter().cloned());
                    }
                }
                continue;
            }

            if let Some(dependents) = self.by_tag.get(tag) {
                keys.extend(dependents.iter().cloned());
            }
            if let Some(dependents) = self.by_tag.get(&Tag::whole(tag.kind)) {
                keys.extend(dependents.iter().cloned());
            }
        }
        keys
    }
}
