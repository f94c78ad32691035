// Unit tests for corpus construction.
//
// Covers the ordering and stability properties the sweep relies on: document
// order from the filesystem, restartable iteration, dictionary id stability
// and idempotent phrase application.

use std::fs;

use tempfile::TempDir;

use topicsweep::config::{DictionarySettings, PhraseSettings};
use topicsweep::corpus::bow::build_corpus;
use topicsweep::corpus::dictionary::Dictionary;
use topicsweep::corpus::source::DocumentSource;
use topicsweep::text::phrases::NgramModels;

fn corpus_dir(files: &[(&str, &[u8])]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, body) in files {
        fs::write(dir.path().join(name), body).unwrap();
    }
    dir
}

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(|s| s.to_string()).collect()
}

// ============================================================
// DocumentSource
// ============================================================

#[test]
fn documents_are_ordered_by_file_name_bytes() {
    let dir = corpus_dir(&[
        ("b.txt", b"second"),
        ("B.txt", b"upper"),
        ("a10.txt", b"ten"),
        ("a2.txt", b"two"),
        ("notes.md", b"ignored"),
    ]);
    let source = DocumentSource::open(dir.path(), "txt").unwrap();
    // Uppercase sorts before lowercase; digits compare byte by byte
    assert_eq!(source.names(), vec!["B", "a10", "a2", "b"]);
}

#[test]
fn repeated_enumeration_is_identical() {
    let dir = corpus_dir(&[("x.txt", b"one"), ("y.txt", b"two"), ("z.txt", b"three")]);
    let source = DocumentSource::open(dir.path(), "txt").unwrap();

    let first: Vec<(usize, String, String)> = source
        .documents()
        .map(|d| (d.ordinal, d.name, d.text))
        .collect();
    let second: Vec<(usize, String, String)> = source
        .documents()
        .map(|d| (d.ordinal, d.name, d.text))
        .collect();
    assert_eq!(first, second);
    assert_eq!(first[2], (2, "z".to_string(), "three".to_string()));
}

#[test]
fn unreadable_document_keeps_its_slot() {
    let dir = corpus_dir(&[("a.txt", b"fine"), ("b.txt", &[0xff, 0xfe, 0x00]), ("c.txt", b"ok")]);
    let source = DocumentSource::open(dir.path(), "txt").unwrap();
    let docs: Vec<_> = source.documents().collect();

    assert_eq!(docs.len(), 3);
    assert!(docs[1].text.is_empty());
    assert_eq!(docs[1].read_failure.as_ref().unwrap().name, "b");
    assert!(docs[2].read_failure.is_none());
}

// ============================================================
// Dictionary and Corpus
// ============================================================

#[test]
fn dictionary_ids_are_stable_across_builds() {
    let streams = vec![tokens("sun moon sun"), tokens("star moon"), tokens("comet")];
    let a = Dictionary::build(&streams);
    let b = Dictionary::build(&streams);

    for token in ["sun", "moon", "star", "comet"] {
        assert_eq!(a.id(token), b.id(token));
    }
    assert_eq!(a.id("sun"), Some(0));
    assert_eq!(a.id("comet"), Some(3));
}

#[test]
fn pruning_keeps_relative_id_order() {
    let streams = vec![tokens("rare common mid"), tokens("common mid"), tokens("common")];
    let settings = DictionarySettings {
        no_below: 2,
        no_above: 1.0,
        keep_n: 10,
    };
    let (dictionary, corpus) = build_corpus(
        vec!["d0".into(), "d1".into(), "d2".into()],
        &streams,
        &settings,
    );

    assert_eq!(dictionary.id("rare"), None);
    assert_eq!(dictionary.id("common"), Some(0));
    assert_eq!(dictionary.id("mid"), Some(1));
    assert_eq!(corpus.get(0).unwrap().entries(), &[(0, 1), (1, 1)]);
}

#[test]
fn corpus_can_be_iterated_repeatedly() {
    let streams = vec![tokens("a b"), tokens(""), tokens("b b")];
    let settings = DictionarySettings {
        no_below: 1,
        no_above: 1.0,
        keep_n: 10,
    };
    let (_, corpus) = build_corpus(vec!["0".into(), "1".into(), "2".into()], &streams, &settings);

    let first: Vec<_> = corpus.iter().cloned().collect();
    let second: Vec<_> = corpus.iter().cloned().collect();
    assert_eq!(first, second);
    assert_eq!(corpus.len(), 3);
    assert!(corpus.get(1).unwrap().is_empty());
}

// ============================================================
// Phrase application
// ============================================================

#[test]
fn phrase_application_is_idempotent_per_input() {
    let mut streams = Vec::new();
    for i in 0..8 {
        streams.push(tokens(&format!("new york city trip{i}")));
    }
    let settings = PhraseSettings {
        min_count: 3,
        threshold: 1.0,
        ..Default::default()
    };
    let models = NgramModels::train(&streams, &settings);

    let input = tokens("new york city trip3 new york");
    let once = models.apply(&input);
    assert_eq!(once, models.apply(&input));
    assert!(once.iter().any(|t| t.contains('_')), "got {once:?}");
}
