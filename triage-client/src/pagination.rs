//! Sequential page scan with empty-page recovery, deduplication and a completeness verdict.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use triage_core::FetchMeta;
use triage_vitals::{patient_identifier, PatientRecord};

use crate::envelope::PageEnvelope;
use crate::transport::TransportError;

/// Consecutive pages without a new identifier before the scan may stop.
pub const ZERO_NEW_STREAK_LIMIT: u32 = 5;
/// Page index the scan must pass before stopping when the page count is unknown.
pub const MIN_PAGES_WHEN_UNKNOWN: u64 = 10;
/// Re-fetch passes over pages that stayed empty.
pub const RECOVERY_PASSES: u32 = 2;

pub const MAX_PAGE_SIZE: u32 = 20;

/// Tuning knobs for [`fetch_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: u32,
    /// Extra attempts for a page that came back empty.
    pub max_page_retries: u32,
    /// Hard stop for the sequential scan.
    pub max_total_pages: u64,
    pub inter_page_delay: Duration,
    /// Base delay between empty-page attempts; grows linearly per attempt.
    pub page_retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_page_retries: 3,
            max_total_pages: 60,
            inter_page_delay: Duration::from_millis(250),
            page_retry_delay: Duration::from_millis(500),
        }
    }
}

impl FetchOptions {
    pub fn clamped(self) -> Self {
        Self {
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
            max_page_retries: self.max_page_retries.min(10),
            max_total_pages: self.max_total_pages.clamp(1, 500),
            inter_page_delay: self.inter_page_delay.min(Duration::from_secs(5)),
            page_retry_delay: self.page_retry_delay.min(Duration::from_secs(10)),
        }
    }
}

/// Anything that can serve raw page bodies.
pub trait PageSource {
    fn fetch_page(
        &self,
        page: u64,
        limit: u32,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

/// Deduplicated records plus the metadata needed to judge completeness.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchResult {
    pub patients: Vec<PatientRecord>,
    pub meta: FetchMeta,
}

/// Running state of one scan. Pure bookkeeping; no I/O.
#[derive(Debug, Default)]
pub struct ScanState {
    seen: HashSet<String>,
    records: Vec<PatientRecord>,
    missing: BTreeSet<u64>,
    expected_total: Option<u64>,
    expected_pages: Option<u64>,
    last_page: u64,
    zero_new_streak: u32,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_total(&self) -> Option<u64> {
        self.expected_total
    }

    pub fn expected_pages(&self) -> Option<u64> {
        self.expected_pages
    }

    pub fn last_page(&self) -> u64 {
        self.last_page
    }

    pub fn collected(&self) -> usize {
        self.seen.len()
    }

    pub fn zero_new_streak(&self) -> u32 {
        self.zero_new_streak
    }

    /// Whether `page` should hold records: inside the known range, or anywhere if unknown.
    pub fn expects_records(&self, page: u64) -> bool {
        self.expected_pages.map_or(true, |pages| page <= pages)
    }

    /// Fold in one page from the sequential scan. Returns how many identifiers were new.
    pub fn record_page(&mut self, page: u64, envelope: PageEnvelope) -> usize {
        self.learn_totals(&envelope);
        self.last_page = self.last_page.max(page);

        if envelope.is_empty() {
            self.missing.insert(page);
        }

        let fresh = self.absorb(envelope.patients);
        if fresh == 0 {
            self.zero_new_streak += 1;
        } else {
            self.zero_new_streak = 0;
        }
        fresh
    }

    /// Merge a re-fetched page. Returns true when the page is no longer missing.
    pub fn recover_page(&mut self, page: u64, envelope: PageEnvelope) -> bool {
        self.learn_totals(&envelope);
        if envelope.is_empty() {
            return false;
        }
        self.missing.remove(&page);
        self.absorb(envelope.patients);
        true
    }

    /// Stop on the hard page guard, or after a streak of pages with nothing new
    /// once the scan is past the known (or assumed) last page.
    pub fn should_stop(&self, max_total_pages: u64) -> bool {
        if self.last_page >= max_total_pages {
            return true;
        }
        let horizon = self.expected_pages.unwrap_or(MIN_PAGES_WHEN_UNKNOWN);
        self.zero_new_streak >= ZERO_NEW_STREAK_LIMIT && self.last_page > horizon
    }

    /// Missing pages worth re-fetching: only possible once the page count is known.
    pub fn recoverable_pages(&self) -> Vec<u64> {
        match self.expected_pages {
            Some(pages) => self.missing.range(..=pages).copied().collect(),
            None => Vec::new(),
        }
    }

    fn missing_in_range(&self) -> Vec<u64> {
        match self.expected_pages {
            Some(pages) => self.missing.range(..=pages).copied().collect(),
            None => self.missing.iter().copied().collect(),
        }
    }

    /// Deduplicate by identifier (first seen wins) and compute the completeness verdict.
    pub fn finish(self) -> FetchResult {
        let missing_pages = self.missing_in_range();

        let mut by_id: BTreeMap<String, PatientRecord> = BTreeMap::new();
        let mut anonymous = Vec::new();
        for record in self.records {
            match patient_identifier(&record) {
                Some(id) => {
                    by_id.entry(id).or_insert(record);
                }
                None => anonymous.push(record),
            }
        }

        let collected = by_id.len();
        let complete = match (self.expected_total, self.expected_pages) {
            (Some(total), _) => collected as u64 >= total,
            (None, Some(pages)) => self.last_page >= pages && missing_pages.is_empty(),
            (None, None) => false,
        };

        let mut patients: Vec<PatientRecord> = by_id.into_values().collect();
        patients.extend(anonymous);

        FetchResult {
            patients,
            meta: FetchMeta {
                expected_total: self.expected_total,
                expected_pages: self.expected_pages,
                missing_pages,
                collected,
                complete,
            },
        }
    }

    // First sighting wins.
    fn learn_totals(&mut self, envelope: &PageEnvelope) {
        if self.expected_total.is_none() {
            self.expected_total = envelope.total;
        }
        if self.expected_pages.is_none() {
            self.expected_pages = envelope.total_pages;
        }
    }

    fn absorb(&mut self, records: Vec<PatientRecord>) -> usize {
        let mut fresh = 0;
        for record in records {
            if let Some(id) = patient_identifier(&record) {
                if self.seen.insert(id) {
                    fresh += 1;
                }
            }
            self.records.push(record);
        }
        fresh
    }
}

/// Fetch one page, re-trying with a growing delay while it comes back empty.
async fn fetch_page_with_retry<S: PageSource>(
    source: &S,
    page: u64,
    limit: u32,
    retries: u32,
    delay: Duration,
) -> Result<PageEnvelope, TransportError> {
    let mut attempt = 0u32;
    loop {
        let body = source.fetch_page(page, limit).await?;
        let envelope = PageEnvelope::from_body(&body);
        if !envelope.is_empty() || attempt >= retries {
            return Ok(envelope);
        }
        attempt += 1;
        let wait = delay.saturating_mul(attempt);
        tracing::warn!(page, attempt, ?wait, "page came back empty, retrying");
        tokio::time::sleep(wait).await;
    }
}

/// Drive `source` page by page until the scan converges, then reconcile.
///
/// Transport failures abort the whole fetch; empty or duplicated pages never do.
pub async fn fetch_all<S: PageSource>(
    source: &S,
    options: FetchOptions,
) -> Result<FetchResult, TransportError> {
    let options = options.clamped();
    let mut state = ScanState::new();
    let mut page = 1u64;

    loop {
        let retries = if state.expects_records(page) {
            options.max_page_retries
        } else {
            0
        };
        let envelope = fetch_page_with_retry(
            source,
            page,
            options.page_size,
            retries,
            options.page_retry_delay,
        )
        .await?;
        let batch = envelope.patients.len();
        let has_next = envelope.has_next;
        let fresh = state.record_page(page, envelope);
        tracing::info!(
            page,
            batch,
            fresh,
            ?has_next,
            collected = state.collected(),
            "fetched page"
        );

        if state.should_stop(options.max_total_pages) {
            break;
        }
        page += 1;
        tokio::time::sleep(options.inter_page_delay).await;
    }

    for pass in 1..=RECOVERY_PASSES {
        let pending = state.recoverable_pages();
        if pending.is_empty() {
            break;
        }
        tracing::warn!(pass, pages = ?pending, "re-fetching missing pages");
        for page in pending {
            tokio::time::sleep(options.inter_page_delay).await;
            let envelope = fetch_page_with_retry(
                source,
                page,
                options.page_size,
                options.max_page_retries,
                options.page_retry_delay,
            )
            .await?;
            if state.recover_page(page, envelope) {
                tracing::info!(page, collected = state.collected(), "recovered page");
            }
        }
    }

    let result = state.finish();
    tracing::info!(
        collected = result.meta.collected,
        expected_total = ?result.meta.expected_total,
        expected_pages = ?result.meta.expected_pages,
        missing = ?result.meta.missing_pages,
        complete = result.meta.complete,
        "fetch finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn envelope(ids: &[&str], total: Option<u64>, pages: Option<u64>) -> PageEnvelope {
        PageEnvelope {
            patients: ids
                .iter()
                .map(|id| json!({"patient_id": id}).as_object().cloned().expect("object"))
                .collect(),
            total,
            total_pages: pages,
            has_next: None,
        }
    }

    #[test]
    fn totals_are_learned_once() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A"], Some(10), Some(2)));
        state.record_page(2, envelope(&["B"], Some(99), Some(9)));
        assert_eq!(state.expected_total(), Some(10));
        assert_eq!(state.expected_pages(), Some(2));
    }

    #[test]
    fn streak_counts_pages_without_new_identifiers() {
        let mut state = ScanState::new();
        assert_eq!(state.record_page(1, envelope(&["A", "B"], None, None)), 2);
        assert_eq!(state.record_page(2, envelope(&["B"], None, None)), 0);
        assert_eq!(state.record_page(3, envelope(&[], None, None)), 0);
        assert_eq!(state.zero_new_streak(), 2);
        assert_eq!(state.record_page(4, envelope(&["C"], None, None)), 1);
        assert_eq!(state.zero_new_streak(), 0);
    }

    #[test]
    fn stops_only_after_streak_past_known_pages() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A"], None, Some(3)));
        for page in 2..=5 {
            state.record_page(page, envelope(&[], None, None));
        }
        assert!(!state.should_stop(100));
        state.record_page(6, envelope(&[], None, None));
        assert!(state.should_stop(100));
    }

    #[test]
    fn unknown_page_count_uses_conservative_horizon() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A"], None, None));
        for page in 2..=MIN_PAGES_WHEN_UNKNOWN {
            state.record_page(page, envelope(&["A"], None, None));
        }
        assert!(state.zero_new_streak() >= ZERO_NEW_STREAK_LIMIT);
        assert!(!state.should_stop(100));
        state.record_page(MIN_PAGES_WHEN_UNKNOWN + 1, envelope(&[], None, None));
        assert!(state.should_stop(100));
    }

    #[test]
    fn hard_guard_stops_runaway_scans() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A"], None, None));
        state.record_page(2, envelope(&["B"], None, None));
        assert!(state.should_stop(2));
    }

    #[test]
    fn recovery_skips_pages_beyond_known_total() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A"], Some(3), Some(3)));
        state.record_page(2, envelope(&[], None, None));
        state.record_page(3, envelope(&["C"], None, None));
        state.record_page(4, envelope(&[], None, None));
        assert_eq!(state.recoverable_pages(), vec![2]);

        assert!(!state.recover_page(2, envelope(&[], None, None)));
        assert!(state.recover_page(2, envelope(&["B"], None, None)));
        assert!(state.recoverable_pages().is_empty());

        let result = state.finish();
        assert!(result.meta.complete);
        assert!(result.meta.missing_pages.is_empty());
        assert_eq!(result.meta.collected, 3);
    }

    #[test]
    fn finish_deduplicates_and_keeps_anonymous_records() {
        let record = |value: Value| value.as_object().cloned().expect("object");
        let mut state = ScanState::new();
        state.record_page(
            1,
            PageEnvelope {
                patients: vec![
                    record(json!({"patient_id": "B"})),
                    record(json!({"patient_id": "A", "age": 41})),
                    record(json!({"name": "anon"})),
                ],
                total_pages: Some(1),
                ..PageEnvelope::default()
            },
        );
        state.record_page(
            2,
            PageEnvelope {
                patients: vec![record(json!({"patient_id": "A", "age": 99}))],
                ..PageEnvelope::default()
            },
        );

        let result = state.finish();
        let ids: Vec<_> = result.patients.iter().map(patient_identifier).collect();
        assert_eq!(ids, vec![Some("A".into()), Some("B".into()), None]);
        assert_eq!(result.patients[0]["age"], json!(41));
        assert!(result.meta.complete);
    }

    #[test]
    fn completeness_by_total_count() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A", "B"], Some(3), Some(1)));
        let result = state.finish();
        assert!(!result.meta.complete);
        assert_eq!(result.meta.collected, 2);
    }

    #[test]
    fn completeness_unknown_without_signals() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A"], None, None));
        assert!(!state.finish().meta.complete);
    }

    #[test]
    fn page_count_completeness_requires_no_gaps() {
        let mut state = ScanState::new();
        state.record_page(1, envelope(&["A"], None, Some(2)));
        state.record_page(2, envelope(&[], None, None));
        let result = state.finish();
        assert_eq!(result.meta.missing_pages, vec![2]);
        assert!(!result.meta.complete);
    }

    #[test]
    fn options_are_clamped() {
        let options = FetchOptions {
            page_size: 500,
            max_page_retries: 50,
            max_total_pages: 0,
            inter_page_delay: Duration::from_secs(60),
            page_retry_delay: Duration::from_secs(60),
        }
        .clamped();
        assert_eq!(options.page_size, MAX_PAGE_SIZE);
        assert_eq!(options.max_page_retries, 10);
        assert_eq!(options.max_total_pages, 1);
        assert_eq!(options.inter_page_delay, Duration::from_secs(5));
        assert_eq!(
            FetchOptions {
                page_size: 0,
                ..FetchOptions::default()
            }
            .clamped()
            .page_size,
            1
        );
    }

    /// Serves scripted bodies per page; once a script runs dry the last body repeats.
    struct ScriptedSource {
        pages: Mutex<HashMap<u64, Vec<Value>>>,
        calls: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<(u64, Vec<Value>)>) -> Self {
            Self {
                pages: Mutex::new(pages.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, page: u64) -> usize {
            self.calls
                .lock()
                .expect("calls lock")
                .iter()
                .filter(|p| **p == page)
                .count()
        }
    }

    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, page: u64, _limit: u32) -> Result<Value, TransportError> {
            self.calls.lock().expect("calls lock").push(page);
            let mut pages = self.pages.lock().expect("pages lock");
            let body = match pages.get_mut(&page) {
                Some(script) if script.len() > 1 => script.remove(0),
                Some(script) => script.first().cloned().unwrap_or(Value::Null),
                None => json!({"data": []}),
            };
            Ok(body)
        }
    }

    fn fast_options() -> FetchOptions {
        FetchOptions {
            page_size: 5,
            max_page_retries: 2,
            max_total_pages: 40,
            inter_page_delay: Duration::ZERO,
            page_retry_delay: Duration::ZERO,
        }
    }

    fn page_body(ids: &[&str], total: u64, pages: u64) -> Value {
        json!({
            "data": ids.iter().map(|id| json!({"patient_id": id})).collect::<Vec<_>>(),
            "pagination": {"total": total, "totalPages": pages, "hasNext": true}
        })
    }

    #[tokio::test]
    async fn empty_page_is_retried_until_it_fills() {
        let source = ScriptedSource::new(vec![
            (1, vec![page_body(&["A", "B"], 4, 2)]),
            (2, vec![json!({"data": []}), page_body(&["C", "D"], 4, 2)]),
        ]);

        let result = fetch_all(&source, fast_options()).await.expect("fetch");
        assert!(result.meta.complete);
        assert_eq!(result.meta.collected, 4);
        assert_eq!(source.calls_for(2), 2);
        // Pages past the known range are accepted empty without retries.
        assert_eq!(source.calls_for(3), 1);
    }

    #[tokio::test]
    async fn recovery_pass_fills_a_page_that_stayed_empty() {
        let empty = json!({"data": []});
        let source = ScriptedSource::new(vec![
            (1, vec![page_body(&["A"], 3, 3)]),
            (
                2,
                vec![
                    empty.clone(),
                    empty.clone(),
                    empty.clone(),
                    page_body(&["B"], 3, 3),
                ],
            ),
            (3, vec![page_body(&["C"], 3, 3)]),
        ]);

        let result = fetch_all(&source, fast_options()).await.expect("fetch");
        assert!(result.meta.complete);
        assert!(result.meta.missing_pages.is_empty());
        assert_eq!(source.calls_for(2), 4);
    }

    #[tokio::test]
    async fn duplicate_pages_do_not_inflate_the_collection() {
        let source = ScriptedSource::new(vec![
            (1, vec![page_body(&["A", "B"], 3, 2)]),
            (2, vec![page_body(&["A", "B"], 3, 2)]),
        ]);

        let result = fetch_all(&source, fast_options()).await.expect("fetch");
        assert_eq!(result.patients.len(), 2);
        assert_eq!(result.meta.collected, 2);
        assert!(!result.meta.complete);
    }

    #[tokio::test]
    async fn transport_failures_abort_the_fetch() {
        struct Failing;
        impl PageSource for Failing {
            async fn fetch_page(&self, _page: u64, _limit: u32) -> Result<Value, TransportError> {
                Err(TransportError::Status {
                    status: 401,
                    status_text: "Unauthorized".into(),
                    body: "bad key".into(),
                })
            }
        }

        let err = fetch_all(&Failing, fast_options()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}
