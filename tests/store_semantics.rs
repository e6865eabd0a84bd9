// Store semantics tests over the public API: filtering, mutation, and
// failure-leaves-file-intact guarantees.
use gridfile::api::{ErrorKind, LocalClient, Row, TableRef};

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(field, value)| (field.to_string(), value.to_string()))
        .collect()
}

fn client(dir: &std::path::Path) -> LocalClient {
    LocalClient::new().with_table_dir(dir)
}

fn seeded_client(dir: &std::path::Path) -> LocalClient {
    let client = client(dir);
    client
        .create_table(&TableRef::name("people"), &columns(&["name", "street"]))
        .expect("create");
    let store = client.open_table(&TableRef::name("people")).expect("open");
    store
        .insert(Row::from_pairs([("name", "otto"), ("street", "Landstr")]))
        .expect("insert");
    store
        .insert(Row::from_pairs([("name", "maier"), ("street", "Hauptstr")]))
        .expect("insert");
    store
        .insert(Row::from_pairs([("name", "otto"), ("street", "Hauptstr")]))
        .expect("insert");
    client
}

#[test]
fn written_rows_read_back_unchanged() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");

    let rows = store.fetch(&[]).expect("fetch");
    assert_eq!(
        rows,
        vec![
            Row::from_pairs([("name", "otto"), ("street", "Landstr")]),
            Row::from_pairs([("name", "maier"), ("street", "Hauptstr")]),
            Row::from_pairs([("name", "otto"), ("street", "Hauptstr")]),
        ]
    );
}

#[test]
fn fetch_with_filter_returns_the_matching_subsequence() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");

    let rows = store.fetch(&pairs(&[("name", "otto")])).expect("fetch");
    assert_eq!(
        rows,
        vec![
            Row::from_pairs([("name", "otto"), ("street", "Landstr")]),
            Row::from_pairs([("name", "otto"), ("street", "Hauptstr")]),
        ]
    );
}

#[test]
fn insert_appends_and_leaves_prior_rows_alone() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");

    let before = store.fetch(&[]).expect("fetch");
    store
        .insert(Row::from_pairs([("name", "kunz"), ("street", "Ringstr")]))
        .expect("insert");
    let after = store.fetch(&[]).expect("fetch");

    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(&after[..before.len()], &before[..]);
    assert_eq!(
        after.last().expect("last"),
        &Row::from_pairs([("name", "kunz"), ("street", "Ringstr")])
    );
}

#[test]
fn update_rewrites_matched_rows_only() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");

    let matched = store
        .update(&pairs(&[("street", "Waldstr")]), &pairs(&[("name", "maier")]))
        .expect("update");
    assert_eq!(matched, 1);

    let rows = store.fetch(&[]).expect("fetch");
    assert_eq!(
        rows,
        vec![
            Row::from_pairs([("name", "otto"), ("street", "Landstr")]),
            Row::from_pairs([("name", "maier"), ("street", "Waldstr")]),
            Row::from_pairs([("name", "otto"), ("street", "Hauptstr")]),
        ]
    );
}

#[test]
fn delete_by_filter_keeps_the_rest_in_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");

    let deleted = store.delete(&pairs(&[("name", "otto")])).expect("delete");
    assert_eq!(deleted, 2);
    let rows = store.fetch(&[]).expect("fetch");
    assert_eq!(
        rows,
        vec![Row::from_pairs([("name", "maier"), ("street", "Hauptstr")])]
    );
}

#[test]
fn delete_without_criteria_empties_the_table() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");

    store.delete(&[]).expect("delete");
    assert!(store.fetch(&[]).expect("fetch").is_empty());

    // The header line survives a wipe; the table stays usable.
    store
        .insert(Row::from_pairs([("name", "neu"), ("street", "Neustr")]))
        .expect("insert");
    assert_eq!(store.fetch(&[]).expect("fetch").len(), 1);
}

#[test]
fn recreate_on_the_same_path_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let err = client
        .create_table(&TableRef::name("people"), &columns(&["name"]))
        .expect_err("exists");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn failed_mutations_leave_the_file_byte_identical() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");
    let path = store.path().to_path_buf();
    let before = std::fs::read(&path).expect("read");

    let unknown = store
        .insert(Row::from_pairs([
            ("name", "kunz"),
            ("street", "Ringstr"),
            ("city", "Berlin"),
        ]))
        .expect_err("unknown field");
    assert_eq!(unknown.kind(), ErrorKind::Usage);

    let missing = store
        .insert(Row::from_pairs([("name", "kunz")]))
        .expect_err("missing field");
    assert_eq!(missing.kind(), ErrorKind::MissingField);

    let delimiter = store
        .update(&pairs(&[("street", "a,b")]), &[])
        .expect_err("delimiter");
    assert_eq!(delimiter.kind(), ErrorKind::Usage);

    assert_eq!(std::fs::read(&path).expect("read"), before);
}

#[test]
fn backup_restore_round_trips_through_the_client() {
    let temp = tempfile::tempdir().expect("tempdir");
    let client = seeded_client(temp.path());
    let store = client.open_table(&TableRef::name("people")).expect("open");

    store.backup().expect("backup");
    store.delete(&pairs(&[("name", "otto")])).expect("delete");
    assert_eq!(store.fetch(&[]).expect("fetch").len(), 1);

    store.restore().expect("restore");
    assert_eq!(store.fetch(&[]).expect("fetch").len(), 3);
}
