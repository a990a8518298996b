//! JournalDao interface tests.
//!
//! These tests verify the contract of the JournalDao trait. Every test
//! writes under fresh persistence ids and tags, and ordering-based tests
//! measure from the journal's current maximum, so they can share one
//! database.

use uuid::Uuid;

use sqljournal::{JournalDao, JournalRow, StorageError};

/// Unique persistence id for one test.
pub fn pid(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Unique tag for one test.
pub fn tag(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

/// Create a row with a recognizable payload.
pub fn make_row(persistence_id: &str, seq: i64) -> JournalRow {
    JournalRow::new(persistence_id, seq, vec![1, 2, 3, seq as u8])
        .with_manifest(format!("Event{}", seq))
        .with_writer_uuid("writer-1")
}

/// Create `count` sequential rows starting at `start`.
pub fn make_rows(persistence_id: &str, start: i64, count: i64) -> Vec<JournalRow> {
    (start..start + count)
        .map(|seq| make_row(persistence_id, seq))
        .collect()
}

async fn current_max<D: JournalDao + ?Sized>(dao: &D) -> i64 {
    dao.max_ordering()
        .await
        .expect("max_ordering should succeed")
        .unwrap_or(0)
}

// =============================================================================
// append_batch tests
// =============================================================================

pub async fn test_append_and_read_back<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("append");

    let result = dao
        .append_batch(make_rows(&id, 1, 5))
        .await
        .expect("append should succeed");
    assert_eq!(result.rows_copied, 5);

    let rows = dao
        .select_range(&id, 1, 5, None)
        .await
        .expect("select should succeed");
    let seqs: Vec<i64> = rows.iter().map(|r| r.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    assert!(
        rows.windows(2).all(|w| w[0].ordering < w[1].ordering),
        "orderings follow input order"
    );
}

pub async fn test_append_preserves_row_data<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("fields");
    let row = JournalRow::new(&id, 1, vec![9, 8, 7])
        .with_manifest("OrderPlaced")
        .with_identifier(42)
        .with_writer_uuid("writer-fields")
        .with_tags(["blue", "red"]);
    let timestamp = row.timestamp;

    dao.append_batch(vec![row]).await.expect("append should succeed");

    let rows = dao.select_range(&id, 1, 1, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    let stored = &rows[0];
    assert!(stored.ordering > 0, "ordering assigned by storage");
    assert_eq!(stored.message, vec![9, 8, 7]);
    assert_eq!(stored.manifest, "OrderPlaced");
    assert_eq!(stored.identifier, Some(42));
    assert_eq!(stored.writer_uuid, "writer-fields");
    assert_eq!(stored.timestamp, timestamp);
    assert!(!stored.deleted);
    assert_eq!(stored.tags, vec!["blue".to_string(), "red".to_string()]);
}

pub async fn test_append_empty_batch<D: JournalDao + ?Sized>(dao: &D) {
    let result = dao
        .append_batch(Vec::new())
        .await
        .expect("empty append should succeed");
    assert_eq!(result.rows_copied, 0);
}

pub async fn test_append_mixed_streams<D: JournalDao + ?Sized>(dao: &D) {
    let a = pid("mixed-a");
    let b = pid("mixed-b");

    let rows = vec![
        make_row(&a, 1),
        make_row(&b, 1),
        make_row(&a, 2),
        make_row(&b, 2),
    ];
    dao.append_batch(rows).await.expect("append should succeed");

    let a_rows = dao.select_range(&a, 1, 10, None).await.unwrap();
    let b_rows = dao.select_range(&b, 1, 10, None).await.unwrap();
    assert_eq!(a_rows.len(), 2);
    assert_eq!(b_rows.len(), 2);
    // input order: a1 < b1 < a2 < b2
    assert!(a_rows[0].ordering < b_rows[0].ordering);
    assert!(b_rows[0].ordering < a_rows[1].ordering);
    assert!(a_rows[1].ordering < b_rows[1].ordering);
}

pub async fn test_append_duplicate_sequence<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("duplicate");
    dao.append_batch(make_rows(&id, 1, 3)).await.unwrap();

    let result = dao.append_batch(vec![make_row(&id, 2)]).await;
    assert!(
        matches!(result, Err(StorageError::ConstraintViolation(_))),
        "duplicate key should be a constraint violation, got {:?}",
        result
    );

    let rows = dao.select_range(&id, 1, 10, None).await.unwrap();
    assert_eq!(rows.len(), 3, "original rows untouched");
}

pub async fn test_append_rejects_separator_in_tag<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("bad-tag");
    let result = dao
        .append_batch(vec![make_row(&id, 1).with_tags(["a;b"])])
        .await;
    assert!(matches!(result, Err(StorageError::InvalidTag(_))));

    let rows = dao.select_range(&id, 1, 10, None).await.unwrap();
    assert!(rows.is_empty(), "nothing written for a rejected batch");
}

pub async fn test_large_batch<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("large");
    let result = dao
        .append_batch(make_rows(&id, 1, 250))
        .await
        .expect("append should succeed");
    assert_eq!(result.rows_copied, 250);

    let rows = dao.select_range(&id, 1, 1000, None).await.unwrap();
    assert_eq!(rows.len(), 250);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.sequence_number, i as i64 + 1);
    }
}

// =============================================================================
// select_range tests
// =============================================================================

pub async fn test_select_range_bounds<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("range");
    dao.append_batch(make_rows(&id, 1, 10)).await.unwrap();

    let rows = dao.select_range(&id, 3, 6, None).await.unwrap();
    let seqs: Vec<i64> = rows.iter().map(|r| r.sequence_number).collect();
    assert_eq!(seqs, vec![3, 4, 5, 6]);

    let limited = dao.select_range(&id, 3, 6, Some(2)).await.unwrap();
    let seqs: Vec<i64> = limited.iter().map(|r| r.sequence_number).collect();
    assert_eq!(seqs, vec![3, 4]);
}

pub async fn test_select_range_empty_cases<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("range-empty");
    dao.append_batch(make_rows(&id, 1, 3)).await.unwrap();

    assert!(dao.select_range(&id, 5, 2, None).await.unwrap().is_empty());
    assert!(dao.select_range(&id, 1, 3, Some(0)).await.unwrap().is_empty());
    assert!(dao
        .select_range(&pid("unknown"), 1, i64::MAX, None)
        .await
        .unwrap()
        .is_empty());
}

// =============================================================================
// max_sequence_number tests
// =============================================================================

pub async fn test_max_sequence_number<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("max");
    assert_eq!(dao.max_sequence_number(&id, None).await.unwrap(), None);

    dao.append_batch(make_rows(&id, 1, 5)).await.unwrap();
    assert_eq!(dao.max_sequence_number(&id, None).await.unwrap(), Some(5));
    assert_eq!(dao.max_sequence_number(&id, Some(4)).await.unwrap(), Some(5));
    assert_eq!(dao.max_sequence_number(&id, Some(6)).await.unwrap(), None);
}

pub async fn test_max_sequence_number_counts_deleted_rows<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("max-deleted");
    dao.append_batch(make_rows(&id, 1, 5)).await.unwrap();
    dao.mark_deleted(&id, 5).await.unwrap();

    assert_eq!(dao.max_sequence_number(&id, None).await.unwrap(), Some(5));
}

// =============================================================================
// deletion tests
// =============================================================================

pub async fn test_mark_deleted_hides_rows<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("mark");
    dao.append_batch(make_rows(&id, 1, 5)).await.unwrap();

    let flagged = dao.mark_deleted(&id, 3).await.unwrap();
    assert_eq!(flagged, 3);

    let rows = dao.select_range(&id, 1, 5, None).await.unwrap();
    let seqs: Vec<i64> = rows.iter().map(|r| r.sequence_number).collect();
    assert_eq!(seqs, vec![4, 5]);
    assert_eq!(dao.max_marked_for_deletion(&id).await.unwrap(), Some(3));
}

pub async fn test_max_marked_for_deletion_without_deletes<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("unmarked");
    dao.append_batch(make_rows(&id, 1, 2)).await.unwrap();
    assert_eq!(dao.max_marked_for_deletion(&id).await.unwrap(), None);
}

pub async fn test_high_water_mark_upsert<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("hwm");
    assert_eq!(dao.metadata_high_water_mark(&id).await.unwrap(), None);

    dao.record_high_water_mark(&id, 3).await.unwrap();
    assert_eq!(dao.metadata_high_water_mark(&id).await.unwrap(), Some(3));

    dao.record_high_water_mark(&id, 7).await.unwrap();
    assert_eq!(dao.metadata_high_water_mark(&id).await.unwrap(), Some(7));

    // a writer acting on a stale read cannot pull the mark back down
    dao.record_high_water_mark(&id, 5).await.unwrap();
    assert_eq!(dao.metadata_high_water_mark(&id).await.unwrap(), Some(7));
}

pub async fn test_purge_keeps_max_via_metadata<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("purge");
    dao.append_batch(make_rows(&id, 1, 3)).await.unwrap();
    dao.mark_deleted(&id, 3).await.unwrap();
    dao.record_high_water_mark(&id, 3).await.unwrap();

    let purged = dao.purge_up_to(&id, 3).await.unwrap();
    assert_eq!(purged, 3);
    assert_eq!(dao.max_marked_for_deletion(&id).await.unwrap(), None);

    // compatibility mode consults the metadata row
    assert_eq!(dao.max_sequence_number(&id, None).await.unwrap(), Some(3));
}

pub async fn test_purge_removes_tag_rows<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("purge-tags");
    let t = tag("purge");
    let base = current_max(dao).await;
    dao.append_batch(vec![make_row(&id, 1).with_tags([t.as_str()])])
        .await
        .unwrap();
    dao.mark_deleted(&id, 1).await.unwrap();
    dao.purge_up_to(&id, 1).await.unwrap();

    let top = current_max(dao).await;
    let rows = dao.rows_for_tag(&t, base, top.max(base + 1), 10).await.unwrap();
    assert!(rows.is_empty());
}

// =============================================================================
// update_payload tests
// =============================================================================

pub async fn test_update_payload_keeps_ordering<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("update");
    dao.append_batch(make_rows(&id, 1, 2)).await.unwrap();
    let before = dao.select_range(&id, 1, 2, None).await.unwrap();

    let updated = dao.update_payload(&id, 2, vec![0xAA]).await.unwrap();
    assert_eq!(updated, 1);

    let after = dao.select_range(&id, 1, 2, None).await.unwrap();
    assert_eq!(after[1].message, vec![0xAA]);
    assert_eq!(after[1].ordering, before[1].ordering);
    assert_eq!(after[0], before[0]);

    assert_eq!(dao.update_payload(&id, 9, vec![1]).await.unwrap(), 0);
}

// =============================================================================
// ordering-based queries
// =============================================================================

pub async fn test_rows_by_ordering<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("ordering");
    let base = current_max(dao).await;
    dao.append_batch(make_rows(&id, 1, 4)).await.unwrap();
    let top = current_max(dao).await;

    let rows = dao.rows_by_ordering(base, top, 100).await.unwrap();
    let seqs: Vec<i64> = rows.iter().map(|r| r.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);

    let page = dao.rows_by_ordering(base, top, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    let rest = dao.rows_by_ordering(page[1].ordering, top, 100).await.unwrap();
    assert_eq!(rest.len(), 2);

    dao.mark_deleted(&id, 2).await.unwrap();
    let visible = dao.rows_by_ordering(base, top, 100).await.unwrap();
    assert_eq!(visible.len(), 2, "deleted rows are skipped");

    assert!(dao.rows_by_ordering(top, top, 100).await.unwrap().is_empty());
}

pub async fn test_rows_for_tag<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("tagged");
    let red = tag("red");
    let blue = tag("blue");
    let base = current_max(dao).await;

    dao.append_batch(vec![
        make_row(&id, 1).with_tags([red.as_str()]),
        make_row(&id, 2),
        make_row(&id, 3).with_tags([blue.as_str(), red.as_str()]),
        make_row(&id, 4).with_tags([blue.as_str()]),
    ])
    .await
    .unwrap();
    let top = current_max(dao).await;

    let rows = dao.rows_for_tag(&red, base, top, 100).await.unwrap();
    let seqs: Vec<i64> = rows.iter().map(|r| r.sequence_number).collect();
    assert_eq!(seqs, vec![1, 3]);
    assert!(rows[1].tags.contains(&blue), "other tags come back too");

    dao.mark_deleted(&id, 1).await.unwrap();
    let rows = dao.rows_for_tag(&red, base, top, 100).await.unwrap();
    let seqs: Vec<i64> = rows.iter().map(|r| r.sequence_number).collect();
    assert_eq!(seqs, vec![3]);
}

pub async fn test_rows_for_tag_matches_whole_tags<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("whole-tag");
    let t = tag("t");
    let longer = format!("{}x", t);
    let base = current_max(dao).await;

    dao.append_batch(vec![make_row(&id, 1).with_tags([longer.as_str()])])
        .await
        .unwrap();
    let top = current_max(dao).await;

    assert!(dao.rows_for_tag(&t, base, top, 100).await.unwrap().is_empty());
}

pub async fn test_rows_for_tag_is_case_sensitive<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("tag-case");
    let upper = tag("Red");
    let lower = upper.to_lowercase();
    let base = current_max(dao).await;

    dao.append_batch(vec![
        make_row(&id, 1).with_tags([upper.as_str()]),
        make_row(&id, 2).with_tags([lower.as_str()]),
    ])
    .await
    .unwrap();
    let top = current_max(dao).await;

    let seqs = |rows: Vec<JournalRow>| rows.iter().map(|r| r.sequence_number).collect::<Vec<_>>();
    assert_eq!(seqs(dao.rows_for_tag(&upper, base, top, 100).await.unwrap()), vec![1]);
    assert_eq!(seqs(dao.rows_for_tag(&lower, base, top, 100).await.unwrap()), vec![2]);
}

pub async fn test_rows_for_tag_matches_wildcards_literally<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("tag-literal");
    let t = tag("t");
    let plain = format!("{}ab", t);
    let base = current_max(dao).await;

    dao.append_batch(vec![make_row(&id, 1).with_tags([plain.as_str()])])
        .await
        .unwrap();
    let top = current_max(dao).await;

    for pattern in [format!("{}_b", t), format!("{}%", t)] {
        assert!(dao.rows_for_tag(&pattern, base, top, 100).await.unwrap().is_empty());
    }
    assert_eq!(dao.rows_for_tag(&plain, base, top, 100).await.unwrap().len(), 1);
}

pub async fn test_persistence_ids_after<D: JournalDao + ?Sized>(dao: &D) {
    let a = pid("ids-a");
    let b = pid("ids-b");
    let base = current_max(dao).await;

    dao.append_batch(vec![make_row(&a, 1), make_row(&b, 1), make_row(&a, 2)])
        .await
        .unwrap();
    let top = current_max(dao).await;

    let ids = dao.persistence_ids_after(base, top, 100).await.unwrap();
    let names: Vec<&str> = ids.iter().map(|(id, _)| id.as_str()).collect();
    // ascending by each id's highest ordering: b (2nd row) before a (3rd)
    assert_eq!(names, vec![b.as_str(), a.as_str()]);
    assert_eq!(ids[1].1, top);

    let limited = dao.persistence_ids_after(base, top, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

pub async fn test_orderings_between_includes_deleted<D: JournalDao + ?Sized>(dao: &D) {
    let id = pid("between");
    let base = current_max(dao).await;
    dao.append_batch(make_rows(&id, 1, 3)).await.unwrap();
    dao.mark_deleted(&id, 2).await.unwrap();
    let top = current_max(dao).await;

    let orderings = dao.orderings_between(base, top, 100).await.unwrap();
    assert_eq!(orderings.len(), 3);
    assert!(orderings.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(orderings.last(), Some(&top));

    // the limit keeps the lowest orderings
    let first_two = dao.orderings_between(base, top, 2).await.unwrap();
    assert_eq!(first_two, orderings[..2].to_vec());
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all JournalDao interface tests against a DAO implementation.
#[macro_export]
macro_rules! run_journal_dao_tests {
    ($dao:expr) => {
        use $crate::storage::journal_dao_tests::*;

        // append_batch tests
        test_append_and_read_back($dao).await;
        println!("  test_append_and_read_back: PASSED");

        test_append_preserves_row_data($dao).await;
        println!("  test_append_preserves_row_data: PASSED");

        test_append_empty_batch($dao).await;
        println!("  test_append_empty_batch: PASSED");

        test_append_mixed_streams($dao).await;
        println!("  test_append_mixed_streams: PASSED");

        test_append_duplicate_sequence($dao).await;
        println!("  test_append_duplicate_sequence: PASSED");

        test_append_rejects_separator_in_tag($dao).await;
        println!("  test_append_rejects_separator_in_tag: PASSED");

        test_large_batch($dao).await;
        println!("  test_large_batch: PASSED");

        // select_range tests
        test_select_range_bounds($dao).await;
        println!("  test_select_range_bounds: PASSED");

        test_select_range_empty_cases($dao).await;
        println!("  test_select_range_empty_cases: PASSED");

        // max_sequence_number tests
        test_max_sequence_number($dao).await;
        println!("  test_max_sequence_number: PASSED");

        test_max_sequence_number_counts_deleted_rows($dao).await;
        println!("  test_max_sequence_number_counts_deleted_rows: PASSED");

        // deletion tests
        test_mark_deleted_hides_rows($dao).await;
        println!("  test_mark_deleted_hides_rows: PASSED");

        test_max_marked_for_deletion_without_deletes($dao).await;
        println!("  test_max_marked_for_deletion_without_deletes: PASSED");

        test_high_water_mark_upsert($dao).await;
        println!("  test_high_water_mark_upsert: PASSED");

        test_purge_keeps_max_via_metadata($dao).await;
        println!("  test_purge_keeps_max_via_metadata: PASSED");

        test_purge_removes_tag_rows($dao).await;
        println!("  test_purge_removes_tag_rows: PASSED");

        // update_payload tests
        test_update_payload_keeps_ordering($dao).await;
        println!("  test_update_payload_keeps_ordering: PASSED");

        // ordering-based queries
        test_rows_by_ordering($dao).await;
        println!("  test_rows_by_ordering: PASSED");

        test_rows_for_tag($dao).await;
        println!("  test_rows_for_tag: PASSED");

        test_rows_for_tag_matches_whole_tags($dao).await;
        println!("  test_rows_for_tag_matches_whole_tags: PASSED");

        test_rows_for_tag_is_case_sensitive($dao).await;
        println!("  test_rows_for_tag_is_case_sensitive: PASSED");

        test_rows_for_tag_matches_wildcards_literally($dao).await;
        println!("  test_rows_for_tag_matches_wildcards_literally: PASSED");

        test_persistence_ids_after($dao).await;
        println!("  test_persistence_ids_after: PASSED");

        test_orderings_between_includes_deleted($dao).await;
        println!("  test_orderings_between_includes_deleted: PASSED");
    };
}
