//! Reference retrieval: the store interface, an in-memory store, and the
//! per-worker [`ReferenceIndex`] that scopes, budgets, and caches candidate
//! pools.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use geomatch_matcher_models::ReferenceRecord;
use lru::LruCache;

use crate::RetrievalError;
use crate::scorer::PreparedText;

/// One bounded read against a reference collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest<'a> {
    /// Collection to read from.
    pub collection: &'a str,
    /// Only rows with this postal code; `None` reads the whole collection.
    pub postal_code: Option<&'a str>,
    /// Only rows in this partition; `None` ignores partitioning.
    pub partition: Option<&'a str>,
    /// Maximum rows to return.
    pub limit: usize,
}

/// A reference store connection owned by a single worker.
pub trait ReferenceStore: Send {
    /// Returns at most `request.limit` rows matching the request, in a
    /// stable order.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the read fails.
    fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<Vec<ReferenceRecord>, RetrievalError>;
}

/// Opens independent [`ReferenceStore`] connections, one per worker.
pub trait ReferenceSource: Send + Sync {
    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the store cannot be opened.
    fn open(&self) -> Result<Box<dyn ReferenceStore>, RetrievalError>;
}

// ── In-memory store ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryCollection {
    rows: Vec<(Option<String>, ReferenceRecord)>,
    by_postal_code: BTreeMap<String, Vec<usize>>,
}

impl MemoryCollection {
    fn push(&mut self, partition: Option<String>, record: ReferenceRecord) {
        let position = self.rows.len();
        self.by_postal_code
            .entry(record.postal_code.trim().to_string())
            .or_default()
            .push(position);
        self.rows.push((partition, record));
    }
}

/// Reference collections held in memory, shared by every worker.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    collections: Arc<BTreeMap<String, MemoryCollection>>,
}

impl MemorySource {
    /// Starts building a source.
    #[must_use]
    pub fn builder() -> MemorySourceBuilder {
        MemorySourceBuilder::default()
    }

    /// Number of rows in a collection (0 if unknown).
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.rows.len())
    }
}

impl ReferenceSource for MemorySource {
    fn open(&self) -> Result<Box<dyn ReferenceStore>, RetrievalError> {
        Ok(Box::new(MemoryStore {
            collections: Arc::clone(&self.collections),
        }))
    }
}

/// Builder for [`MemorySource`].
#[derive(Debug, Default)]
pub struct MemorySourceBuilder {
    collections: BTreeMap<String, MemoryCollection>,
}

impl MemorySourceBuilder {
    /// Appends records to a collection, optionally tagged with a partition.
    #[must_use]
    pub fn add(
        mut self,
        collection: &str,
        partition: Option<&str>,
        records: impl IntoIterator<Item = ReferenceRecord>,
    ) -> Self {
        let target = self.collections.entry(collection.to_string()).or_default();
        for record in records {
            target.push(partition.map(str::to_string), record);
        }
        self
    }

    /// Freezes the collections.
    #[must_use]
    pub fn build(self) -> MemorySource {
        MemorySource {
            collections: Arc::new(self.collections),
        }
    }
}

struct MemoryStore {
    collections: Arc<BTreeMap<String, MemoryCollection>>,
}

impl ReferenceStore for MemoryStore {
    fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<Vec<ReferenceRecord>, RetrievalError> {
        let Some(collection) = self.collections.get(request.collection) else {
            log::debug!("Unknown reference collection {:?}", request.collection);
            return Ok(Vec::new());
        };

        let in_partition = |partition: &Option<String>| {
            request
                .partition
                .is_none_or(|wanted| partition.as_deref() == Some(wanted))
        };

        let records: Vec<ReferenceRecord> = match request.postal_code {
            Some(postal_code) => collection
                .by_postal_code
                .get(postal_code)
                .map(|positions| {
                    positions
                        .iter()
                        .map(|&i| &collection.rows[i])
                        .filter(|(partition, _)| in_partition(partition))
                        .take(request.limit)
                        .map(|(_, record)| record.clone())
                        .collect()
                })
                .unwrap_or_default(),
            None => collection
                .rows
                .iter()
                .filter(|(partition, _)| in_partition(partition))
                .take(request.limit)
                .map(|(_, record)| record.clone())
                .collect(),
        };

        Ok(records)
    }
}

// ── Per-worker index ────────────────────────────────────────────────

/// A reference record prepared for scoring.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The record as retrieved.
    pub record: ReferenceRecord,
    /// Normalized canonical text with keyword facts.
    pub text: PreparedText,
}

/// A cached, shareable list of candidates in retrieval order.
pub type CandidatePool = Arc<Vec<Candidate>>;

#[derive(Debug)]
struct Gathered {
    records: Vec<ReferenceRecord>,
    /// `false` if any partition failed.
    complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    collection: String,
    postal_code: Option<String>,
    partitioned: bool,
}

/// Postal-code scoped, budgeted, cached candidate retrieval for one worker.
pub struct ReferenceIndex {
    store: Box<dyn ReferenceStore>,
    partitions: Vec<String>,
    budget: usize,
    cache: LruCache<PoolKey, CandidatePool>,
}

impl ReferenceIndex {
    /// Wraps a worker's store.
    ///
    /// `partitions` are scanned in the given order by partitioned lookups;
    /// `budget` caps the rows gathered per lookup; `cache_capacity` bounds
    /// the number of pools kept.
    #[must_use]
    pub fn new(
        store: Box<dyn ReferenceStore>,
        partitions: Vec<String>,
        budget: usize,
        cache_capacity: NonZeroUsize,
    ) -> Self {
        Self {
            store,
            partitions,
            budget,
            cache: LruCache::new(cache_capacity),
        }
    }

    /// Number of pools currently cached.
    #[must_use]
    pub fn cached_pools(&self) -> usize {
        self.cache.len()
    }

    /// Gathers up to `budget` records for a postal code.
    ///
    /// A partitioned lookup scans partitions in priority order, asking each
    /// only for the rows still missing and stopping once the budget is
    /// reached. A partition that fails is logged and contributes nothing.
    /// An empty postal code yields no records.
    pub fn fetch_records(
        &mut self,
        collection: &str,
        postal_code: Option<&str>,
        partitioned: bool,
    ) -> Vec<ReferenceRecord> {
        self.gather(collection, postal_code, partitioned).records
    }

    fn gather(
        &mut self,
        collection: &str,
        postal_code: Option<&str>,
        partitioned: bool,
    ) -> Gathered {
        let postal_code = postal_code.map(str::trim);
        if postal_code.is_some_and(str::is_empty) || self.budget == 0 {
            return Gathered {
                records: Vec::new(),
                complete: true,
            };
        }

        let partitions: Vec<Option<&str>> = if partitioned && !self.partitions.is_empty() {
            self.partitions.iter().map(|p| Some(p.as_str())).collect()
        } else {
            vec![None]
        };

        let mut records: Vec<ReferenceRecord> = Vec::new();
        let mut complete = true;

        for partition in partitions {
            let remaining = self.budget - records.len();
            if remaining == 0 {
                break;
            }

            let request = FetchRequest {
                collection,
                postal_code,
                partition,
                limit: remaining,
            };

            match self.store.fetch(&request) {
                Ok(rows) => {
                    log::trace!(
                        "Fetched {} {collection} rows for {postal_code:?} from partition {partition:?}",
                        rows.len()
                    );
                    records.extend(
                        rows.into_iter()
                            .filter(|row| postal_code.is_none_or(|pc| row.postal_code.trim() == pc))
                            .take(remaining),
                    );
                }
                Err(e) => {
                    log::warn!(
                        "Skipping {collection} partition {partition:?} for {postal_code:?}: {e}"
                    );
                    complete = false;
                }
            }
        }

        Gathered { records, complete }
    }

    /// Returns the prepared candidate pool for a lookup, retrieving and
    /// preparing it on the first request and serving it from the cache
    /// afterwards. A pool missing a failed partition is used for the
    /// current row only, so the next row retries the lookup.
    pub fn candidates_for(
        &mut self,
        collection: &str,
        postal_code: Option<&str>,
        partitioned: bool,
        prepare: &dyn Fn(ReferenceRecord) -> Candidate,
    ) -> CandidatePool {
        let key = PoolKey {
            collection: collection.to_string(),
            postal_code: postal_code.map(|pc| pc.trim().to_string()),
            partitioned,
        };

        if let Some(pool) = self.cache.get(&key) {
            return Arc::clone(pool);
        }

        let gathered = self.gather(collection, postal_code, partitioned);
        let pool: CandidatePool = Arc::new(gathered.records.into_iter().map(prepare).collect());
        if gathered.complete {
            self.cache.put(key, Arc::clone(&pool));
        } else {
            log::debug!("Not caching partial {collection} pool for {postal_code:?}");
        }
        pool
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;

    fn record(text: &str, postal_code: &str) -> ReferenceRecord {
        ReferenceRecord::new(text, postal_code, format!("geo:{text}"))
    }

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn prepare(record: ReferenceRecord) -> Candidate {
        Candidate {
            record,
            text: PreparedText::default(),
        }
    }

    fn corpus() -> MemorySource {
        MemorySource::builder()
            .add(
                "corpus",
                Some("202507"),
                (0..3).map(|i| record(&format!("new {i}"), "47300")),
            )
            .add(
                "corpus",
                Some("202506"),
                (0..5).map(|i| record(&format!("old {i}"), "47300")),
            )
            .add("corpus", Some("202506"), [record("elsewhere", "53100")])
            .build()
    }

    /// Counts fetches and fails for one partition.
    struct ScriptedStore {
        inner: Box<dyn ReferenceStore>,
        failing: Option<String>,
        requests: Arc<Mutex<Vec<(Option<String>, usize)>>>,
    }

    impl ReferenceStore for ScriptedStore {
        fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<Vec<ReferenceRecord>, RetrievalError> {
            self.requests
                .lock()
                .unwrap()
                .push((request.partition.map(str::to_string), request.limit));
            if request.partition.is_some() && request.partition == self.failing.as_deref() {
                return Err(RetrievalError::Query("partition offline".to_string()));
            }
            self.inner.fetch(request)
        }
    }

    fn scripted(
        failing: Option<&str>,
    ) -> (Box<dyn ReferenceStore>, Arc<Mutex<Vec<(Option<String>, usize)>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let store = ScriptedStore {
            inner: corpus().open().unwrap(),
            failing: failing.map(str::to_string),
            requests: Arc::clone(&requests),
        };
        (Box::new(store), requests)
    }

    #[test]
    fn memory_store_filters_by_postal_code_and_partition() {
        let mut store = corpus().open().unwrap();
        let rows = store
            .fetch(&FetchRequest {
                collection: "corpus",
                postal_code: Some("53100"),
                partition: None,
                limit: 10,
            })
            .unwrap();
        assert_eq!(rows, vec![record("elsewhere", "53100")]);

        let rows = store
            .fetch(&FetchRequest {
                collection: "corpus",
                postal_code: Some("47300"),
                partition: Some("202507"),
                limit: 10,
            })
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn unknown_collection_is_empty() {
        let mut store = corpus().open().unwrap();
        let rows = store
            .fetch(&FetchRequest {
                collection: "nodes",
                postal_code: None,
                partition: None,
                limit: 10,
            })
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn never_exceeds_budget_and_prefers_recent_partitions() {
        let (store, requests) = scripted(None);
        let mut index = ReferenceIndex::new(
            store,
            vec!["202507".to_string(), "202506".to_string()],
            5,
            cap(8),
        );

        let rows = index.fetch_records("corpus", Some("47300"), true);
        assert_eq!(rows.len(), 5);
        assert!(rows[..3].iter().all(|r| r.canonical_text.starts_with("new")));
        assert_eq!(
            *requests.lock().unwrap(),
            vec![(Some("202507".to_string()), 5), (Some("202506".to_string()), 2)]
        );
    }

    #[test]
    fn stops_scanning_once_budget_is_reached() {
        let (store, requests) = scripted(None);
        let mut index = ReferenceIndex::new(
            store,
            vec!["202507".to_string(), "202506".to_string()],
            3,
            cap(8),
        );

        assert_eq!(index.fetch_records("corpus", Some("47300"), true).len(), 3);
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_partition_is_skipped() {
        let (store, _) = scripted(Some("202507"));
        let mut index = ReferenceIndex::new(
            store,
            vec!["202507".to_string(), "202506".to_string()],
            100,
            cap(8),
        );

        let rows = index.fetch_records("corpus", Some("47300"), true);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.canonical_text.starts_with("old")));
    }

    #[test]
    fn unpartitioned_lookup_reads_once() {
        let (store, requests) = scripted(None);
        let mut index = ReferenceIndex::new(store, vec!["202507".to_string()], 100, cap(8));

        assert_eq!(index.fetch_records("corpus", Some("47300"), false).len(), 8);
        assert_eq!(*requests.lock().unwrap(), vec![(None, 100)]);
    }

    #[test]
    fn empty_postal_code_yields_nothing() {
        let (store, requests) = scripted(None);
        let mut index = ReferenceIndex::new(store, Vec::new(), 100, cap(8));

        assert!(index.fetch_records("corpus", Some("  "), false).is_empty());
        assert!(requests.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_postal_code_yields_nothing() {
        let mut index = ReferenceIndex::new(corpus().open().unwrap(), Vec::new(), 100, cap(8));
        assert!(index.fetch_records("corpus", Some("99999"), false).is_empty());
    }

    #[test]
    fn unscoped_lookup_reads_whole_collection() {
        let mut index = ReferenceIndex::new(corpus().open().unwrap(), Vec::new(), 100, cap(8));
        let postal_codes: BTreeSet<String> = index
            .fetch_records("corpus", None, false)
            .into_iter()
            .map(|r| r.postal_code)
            .collect();
        assert_eq!(postal_codes.len(), 2);
    }

    #[test]
    fn pools_are_cached_per_postal_code() {
        let (store, requests) = scripted(None);
        let mut index = ReferenceIndex::new(store, Vec::new(), 100, cap(8));

        let first = index.candidates_for("corpus", Some("47300"), false, &prepare);
        let second = index.candidates_for("corpus", Some("47300"), false, &prepare);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(requests.lock().unwrap().len(), 1);

        index.candidates_for("corpus", Some("53100"), false, &prepare);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn cache_is_bounded() {
        let (store, requests) = scripted(None);
        let mut index = ReferenceIndex::new(store, Vec::new(), 100, cap(1));

        index.candidates_for("corpus", Some("47300"), false, &prepare);
        index.candidates_for("corpus", Some("53100"), false, &prepare);
        assert_eq!(index.cached_pools(), 1);

        index.candidates_for("corpus", Some("47300"), false, &prepare);
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn pool_missing_a_partition_is_not_cached() {
        let (store, requests) = scripted(Some("202507"));
        let mut index = ReferenceIndex::new(
            store,
            vec!["202507".to_string(), "202506".to_string()],
            100,
            cap(8),
        );

        let pool = index.candidates_for("corpus", Some("47300"), true, &prepare);
        assert_eq!(pool.len(), 5);
        assert_eq!(index.cached_pools(), 0);

        index.candidates_for("corpus", Some("47300"), true, &prepare);
        assert_eq!(requests.lock().unwrap().len(), 4);
    }
}
