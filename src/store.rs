//! RocksDB-backed persistence for memories, rules, and scheduler state
//!
//! Layout: one database with three column families.
//! - `memories`: Q/A pairs keyed by UUID, rmp-serde encoded
//! - `rules`: pattern/action rules keyed by UUID
//! - `meta`: small opaque blobs (scheduler checkpoints)

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, FlushOptions, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const CF_MEMORIES: &str = "memories";
const CF_RULES: &str = "rules";
const CF_META: &str = "meta";

/// A taught question/answer pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub input_text: String,
    pub output_text: String,
    #[serde(default)]
    pub context: Option<String>,
    pub category: String,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A deterministic substring-match rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub pattern: String,
    pub action: String,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub active_memories: usize,
    pub total_memories: usize,
    pub active_rules: usize,
}

/// Persistence seam for the knowledge engine
pub trait MemoryStore: Send + Sync {
    fn add_memory(
        &self,
        input_text: &str,
        output_text: &str,
        context: Option<&str>,
        category: &str,
    ) -> Result<Memory>;

    /// Fetch active memories, newest first, optionally filtered by category
    fn get_active_memories(&self, category: Option<&str>, limit: usize) -> Result<Vec<Memory>>;

    /// Soft-delete a memory. Returns false if no active memory had this id.
    fn delete_memory(&self, id: Uuid) -> Result<bool>;

    fn add_rule(&self, pattern: &str, action: &str, priority: i32) -> Result<Rule>;

    /// Fetch active rules sorted by priority descending
    fn get_active_rules(&self) -> Result<Vec<Rule>>;

    fn stats(&self) -> Result<StoreStats>;

    fn flush(&self) -> Result<()>;
}

/// Durable home for small state blobs that must survive restarts
pub trait CheckpointStore: Send + Sync {
    fn save_checkpoint(&self, key: &str, value: &[u8]) -> Result<()>;
    fn load_checkpoint(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// RocksDB-backed store
pub struct RocksMemoryStore {
    db: Arc<DB>,
}

impl RocksMemoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create storage dir {path:?}"))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_max_background_jobs(2);

        let cf_opts = || {
            let mut o = Options::default();
            o.set_compression_type(rocksdb::DBCompressionType::Lz4);
            o
        };

        let descriptors = vec![
            ColumnFamilyDescriptor::new(CF_MEMORIES, cf_opts()),
            ColumnFamilyDescriptor::new(CF_RULES, cf_opts()),
            ColumnFamilyDescriptor::new(CF_META, cf_opts()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .with_context(|| format!("Failed to open RocksDB at {path:?}"))?;

        tracing::info!("Storage initialized at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| anyhow!("Missing column family: {name}"))
    }

    fn put_memory(&self, memory: &Memory) -> Result<()> {
        let cf = self.cf(CF_MEMORIES)?;
        let value = rmp_serde::to_vec(memory)
            .with_context(|| format!("Failed to serialize memory {}", memory.id))?;
        self.db
            .put_cf(cf, memory.id.as_bytes(), value)
            .with_context(|| format!("Failed to put memory {}", memory.id))?;
        Ok(())
    }

    fn load_memories(&self) -> Result<Vec<Memory>> {
        let cf = self.cf(CF_MEMORIES)?;
        let mut memories = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.context("RocksDB iteration failed")?;
            match rmp_serde::from_slice::<Memory>(&value) {
                Ok(m) => memories.push(m),
                Err(e) => tracing::warn!("Skipping undecodable memory record: {e}"),
            }
        }
        Ok(memories)
    }
}

/// Retrieval order for active memories: newest first, with the id as a
/// secondary key so equal timestamps sort the same way on every call.
fn newest_first(a: &Memory, b: &Memory) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

impl MemoryStore for RocksMemoryStore {
    fn add_memory(
        &self,
        input_text: &str,
        output_text: &str,
        context: Option<&str>,
        category: &str,
    ) -> Result<Memory> {
        let memory = Memory {
            id: Uuid::new_v4(),
            input_text: input_text.to_string(),
            output_text: output_text.to_string(),
            context: context.map(str::to_string),
            category: category.to_string(),
            confidence: 1.0,
            created_at: Utc::now(),
            is_active: true,
        };

        self.put_memory(&memory)?;
        Ok(memory)
    }

    fn get_active_memories(&self, category: Option<&str>, limit: usize) -> Result<Vec<Memory>> {
        let mut memories: Vec<Memory> = self
            .load_memories()?
            .into_iter()
            .filter(|m| m.is_active)
            .filter(|m| category.map_or(true, |c| m.category == c))
            .collect();

        memories.sort_by(newest_first);
        memories.truncate(limit);
        Ok(memories)
    }

    fn delete_memory(&self, id: Uuid) -> Result<bool> {
        let cf = self.cf(CF_MEMORIES)?;
        let Some(value) = self
            .db
            .get_cf(cf, id.as_bytes())
            .context("RocksDB read failed")?
        else {
            return Ok(false);
        };

        let mut memory: Memory =
            rmp_serde::from_slice(&value).context("Failed to decode memory for deletion")?;
        if !memory.is_active {
            return Ok(false);
        }

        memory.is_active = false;
        self.put_memory(&memory)?;
        Ok(true)
    }

    fn add_rule(&self, pattern: &str, action: &str, priority: i32) -> Result<Rule> {
        let rule = Rule {
            id: Uuid::new_v4(),
            pattern: pattern.to_string(),
            action: action.to_string(),
            priority,
            is_active: true,
            created_at: Utc::now(),
        };

        let cf = self.cf(CF_RULES)?;
        let value = rmp_serde::to_vec(&rule)
            .with_context(|| format!("Failed to serialize rule {}", rule.id))?;
        self.db
            .put_cf(cf, rule.id.as_bytes(), value)
            .with_context(|| format!("Failed to put rule {}", rule.id))?;
        Ok(rule)
    }

    fn get_active_rules(&self) -> Result<Vec<Rule>> {
        let cf = self.cf(CF_RULES)?;
        let mut rules = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.context("RocksDB iteration failed")?;
            match rmp_serde::from_slice::<Rule>(&value) {
                Ok(r) if r.is_active => rules.push(r),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping undecodable rule record: {e}"),
            }
        }

        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }

    fn stats(&self) -> Result<StoreStats> {
        let memories = self.load_memories()?;
        let active_memories = memories.iter().filter(|m| m.is_active).count();
        let active_rules = self.get_active_rules()?.len();

        Ok(StoreStats {
            active_memories,
            total_memories: memories.len(),
            active_rules,
        })
    }

    fn flush(&self) -> Result<()> {
        let mut flush_opts = FlushOptions::default();
        flush_opts.set_wait(true);

        for name in [CF_MEMORIES, CF_RULES, CF_META] {
            let cf = self.cf(name)?;
            self.db
                .flush_cf_opt(cf, &flush_opts)
                .with_context(|| format!("Failed to flush cf {name}"))?;
        }
        Ok(())
    }
}

impl CheckpointStore for RocksMemoryStore {
    fn save_checkpoint(&self, key: &str, value: &[u8]) -> Result<()> {
        let cf = self.cf(CF_META)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, key.as_bytes(), value);
        self.db
            .write(batch)
            .with_context(|| format!("Failed to write checkpoint {key}"))?;
        Ok(())
    }

    fn load_checkpoint(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(CF_META)?;
        self.db
            .get_cf(cf, key.as_bytes())
            .with_context(|| format!("Failed to read checkpoint {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (RocksMemoryStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksMemoryStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn test_memory_roundtrip() {
        let (store, _dir) = open_store();

        let taught = store
            .add_memory("What is Rust?", "A systems language", Some("tech"), "general")
            .unwrap();

        let memories = store.get_active_memories(None, 100).unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].id, taught.id);
        assert_eq!(memories[0].output_text, "A systems language");
        assert_eq!(memories[0].confidence, 1.0);
        assert!(memories[0].is_active);
    }

    #[test]
    fn test_memories_ordered_newest_first() {
        let (store, _dir) = open_store();

        store.add_memory("first", "a", None, "general").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.add_memory("second", "b", None, "general").unwrap();

        let memories = store.get_active_memories(None, 100).unwrap();
        assert_eq!(memories[0].input_text, "second");
        assert_eq!(memories[1].input_text, "first");
    }

    #[test]
    fn test_equal_timestamps_sort_the_same_from_any_input_order() {
        let now = Utc::now();
        let make = |n: u128| Memory {
            id: Uuid::from_u128(n),
            input_text: "q".to_string(),
            output_text: "a".to_string(),
            context: None,
            category: "general".to_string(),
            confidence: 1.0,
            created_at: now,
            is_active: true,
        };

        let mut forward = vec![make(1), make(2), make(3)];
        let mut shuffled = vec![make(3), make(1), make(2)];
        forward.sort_by(newest_first);
        shuffled.sort_by(newest_first);

        let ids: Vec<Uuid> = forward.iter().map(|m| m.id).collect();
        assert_eq!(ids, shuffled.iter().map(|m| m.id).collect::<Vec<_>>());
        assert_eq!(
            ids,
            vec![Uuid::from_u128(3), Uuid::from_u128(2), Uuid::from_u128(1)]
        );
    }

    #[test]
    fn test_category_filter() {
        let (store, _dir) = open_store();

        store.add_memory("q1", "a1", None, "math").unwrap();
        store.add_memory("q2", "a2", None, "general").unwrap();

        let math = store.get_active_memories(Some("math"), 100).unwrap();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].input_text, "q1");
    }

    #[test]
    fn test_soft_delete() {
        let (store, _dir) = open_store();

        let m = store.add_memory("q", "a", None, "general").unwrap();
        assert!(store.delete_memory(m.id).unwrap());
        // Second delete of the same id is a no-op
        assert!(!store.delete_memory(m.id).unwrap());
        assert!(!store.delete_memory(Uuid::new_v4()).unwrap());

        assert!(store.get_active_memories(None, 100).unwrap().is_empty());
        let stats = store.stats().unwrap();
        assert_eq!(stats.active_memories, 0);
        assert_eq!(stats.total_memories, 1);
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let (store, _dir) = open_store();

        store.add_rule("hi there", "Hello you!", 1).unwrap();
        store.add_rule("hi", "Hi!", 5).unwrap();

        let rules = store.get_active_rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].pattern, "hi");
        assert_eq!(rules[0].priority, 5);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let (store, _dir) = open_store();

        assert!(store.load_checkpoint("auto_learner:state").unwrap().is_none());
        store.save_checkpoint("auto_learner:state", b"blob").unwrap();
        assert_eq!(
            store.load_checkpoint("auto_learner:state").unwrap().unwrap(),
            b"blob"
        );
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksMemoryStore::open(dir.path()).unwrap();
            store.add_memory("q", "a", None, "general").unwrap();
            store.flush().unwrap();
        }

        let store = RocksMemoryStore::open(dir.path()).unwrap();
        assert_eq!(store.get_active_memories(None, 100).unwrap().len(), 1);
    }
}
