//! End-to-end trie scenarios.
//!
//! Every scenario runs across the full {arity 2, 16, 256} x {160, 256-bit
//! digest} matrix. Scenario scripts use the shorthand "k/v" for SET,
//! "k/" for DEL, a bare "k" for SET k=k, and "*" for an intermediate
//! commit.

use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use unitrie::data::PathArity;
use unitrie::kv::{InMemoryKvStore, StoreWriter, Traversable};
use unitrie::model::{Blake2bModel, CommitmentModel, HashSize, ProvedStatus, VectorCommitment};
use unitrie::trie::{init_root, TrieChained, TrieReader};

const IDENTITY: &[u8] = b"identity";

fn all_models() -> Vec<Blake2bModel> {
    let mut models = Vec::new();
    for arity in [PathArity::Arity2, PathArity::Arity16, PathArity::Arity256] {
        for hash_size in [HashSize::H160, HashSize::H256] {
            models.push(Blake2bModel::new(arity, hash_size));
        }
    }
    models
}

struct Fixture {
    store: Arc<InMemoryKvStore>,
    model: Arc<Blake2bModel>,
    root: VectorCommitment,
}

fn mk(model: Blake2bModel) -> Fixture {
    let store = Arc::new(InMemoryKvStore::new());
    let root = init_root(&mut StoreWriter(&*store), &model, IDENTITY).unwrap();
    Fixture {
        store,
        model: Arc::new(model),
        root,
    }
}

fn chained(f: &Fixture) -> TrieChained<InMemoryKvStore> {
    TrieChained::new(f.model.clone(), f.store.clone(), &f.root).unwrap()
}

/// Applies a scenario script, committing at every "*" and once at the end
/// if updates are pending. Returns the reopened trie and the final
/// expected key/value map (empty value = deleted).
fn run_scenario<'a>(
    mut tr: TrieChained<InMemoryKvStore>,
    scenario: impl IntoIterator<Item = &'a str>,
) -> (TrieChained<InMemoryKvStore>, HashMap<Vec<u8>, Vec<u8>>) {
    let mut checklist = HashMap::new();
    let mut pending = false;
    for cmd in scenario {
        if cmd == "*" {
            tr = tr.commit_chained().unwrap();
            pending = false;
            continue;
        }
        let (key, value) = match cmd.split_once('/') {
            Some((k, v)) => (k.as_bytes().to_vec(), v.as_bytes().to_vec()),
            None => (cmd.as_bytes().to_vec(), cmd.as_bytes().to_vec()),
        };
        if key.is_empty() {
            continue;
        }
        tr.update(&key, &value).unwrap();
        checklist.insert(key, value);
        pending = true;
    }
    if pending {
        tr = tr.commit_chained().unwrap();
    }
    (tr, checklist)
}

fn check_result(tr: &TrieReader, checklist: &HashMap<Vec<u8>, Vec<u8>>) {
    for (key, expected) in checklist {
        let got = tr.get(key).unwrap();
        if expected.is_empty() {
            assert_eq!(got, None, "key {:?} should be deleted", key);
        } else {
            assert_eq!(got.as_deref(), Some(expected.as_slice()));
        }
    }
}

/// Deterministic pseudo-random scenario: a few hundred short keys with
/// interleaved commits and deletions.
fn seeded_scenario(seed: u64, len: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut commands = Vec::with_capacity(len);
    let mut keys: Vec<String> = Vec::new();
    for i in 0..len {
        let roll: u8 = rng.gen_range(0..10);
        if roll == 0 && !keys.is_empty() {
            let victim = keys[rng.gen_range(0..keys.len())].clone();
            commands.push(format!("{victim}/"));
        } else if roll == 1 {
            commands.push("*".to_string());
        } else {
            let klen = rng.gen_range(1..=8);
            let key: String = (0..klen)
                .map(|_| char::from(rng.gen_range(b'a'..=b'f')))
                .collect();
            // an occasional value long enough to land in the value store
            let value = if roll == 2 {
                format!("{key}{i}").repeat(12)
            } else {
                format!("{key}{i}")
            };
            commands.push(format!("{key}/{value}"));
            keys.push(key);
        }
    }
    commands
}

#[test]
fn test_basic_get_has_delete() {
    for model in all_models() {
        let f = mk(model);
        let mut tr = chained(&f);
        tr.update(b"a", b"a").unwrap();
        tr.update(b"b", b"b").unwrap();
        let mut tr = tr.commit_chained().unwrap();

        assert_eq!(tr.get(b"a").unwrap(), Some(b"a".to_vec()));
        assert!(tr.has(b"b").unwrap());
        assert_eq!(tr.get(b"c").unwrap(), None);
        assert!(!tr.delete(b"c").unwrap());
        assert!(tr.delete(b"b").unwrap());
    }
}

#[test]
fn test_base_scenarios() {
    let scripts: &[&[&str]] = &[
        &["a", "a/"],
        &["a", "*", "a/"],
        &["a", "b", "*", "b/", "a/"],
        &["a", "b", "*", "a/", "b/bb", "c"],
        &["a", "b", "*", "a/", "b", "c"],
        &["acb/", "*", "acb/bca", "acb/123"],
        &["abc", "a", "abc/", "a/"],
        &["abc", "a", "a/", "abc/", "klmn"],
        &["a", "ab", "a/"],
        &["a", "ab", "abc", "abcd", "abcde", "abd/", "a/"],
        &["a", "ab", "abc", "abcd", "abcde", "abcde/", "abcd/", "abc/", "ab/", "a/"],
        &["ab", "acd", "a/", "ab/", "abc", "abd", "abcdafgh", "acd/", "aaaaaaaaaaaaaaaa", "klmnt"],
    ];
    for model in all_models() {
        for script in scripts {
            let f = mk(model);
            let (tr, checklist) = run_scenario(chained(&f), script.iter().copied());
            check_result(&tr, &checklist);
        }
    }
}

#[test]
fn test_update_many() {
    for model in all_models() {
        let f = mk(model);
        let mut tr = chained(&f);
        let keys = [
            "ab", "acd", "a", "dba", "abc", "abd", "abcdafgh", "aaaaaaaaaaaaaaaa", "klmnt",
        ];
        for key in keys {
            let value = key.repeat(5);
            tr.update(key.as_bytes(), value.as_bytes()).unwrap();
        }
        let tr = tr.commit_chained().unwrap();
        for key in keys {
            assert_eq!(
                tr.get(key.as_bytes()).unwrap(),
                Some(key.repeat(5).into_bytes())
            );
        }
    }
}

#[test]
fn test_order_independence() {
    for model in all_models() {
        // the two-key case from the simplest split
        let f1 = mk(model);
        let (tr1, _) = run_scenario(chained(&f1), ["a", "ab"]);
        let f2 = mk(model);
        let (tr2, _) = run_scenario(chained(&f2), ["ab", "a"]);
        assert_eq!(tr1.root(), tr2.root());

        // a larger set, forward vs reverse insertion; bare keys so the
        // final mapping is order-free even with repeated keys
        let keys: Vec<String> = seeded_scenario(7, 60)
            .into_iter()
            .filter(|c| c != "*" && !c.ends_with('/'))
            .map(|c| match c.split_once('/') {
                Some((k, _)) => k.to_string(),
                None => c,
            })
            .collect();
        let f1 = mk(model);
        let (tr1, _) = run_scenario(chained(&f1), keys.iter().map(|s| s.as_str()));
        let f2 = mk(model);
        let (tr2, _) = run_scenario(chained(&f2), keys.iter().rev().map(|s| s.as_str()));
        assert_eq!(tr1.root(), tr2.root());
    }
}

#[test]
fn test_commit_boundary_irrelevance() {
    for model in all_models() {
        let f1 = mk(model);
        let (tr1, _) = run_scenario(chained(&f1), ["a", "ab"]);
        let f2 = mk(model);
        let (tr2, _) = run_scenario(chained(&f2), ["a", "*", "ab"]);
        assert_eq!(tr1.root(), tr2.root());

        let script = seeded_scenario(11, 80);
        let stripped: Vec<&str> = script
            .iter()
            .map(|s| s.as_str())
            .filter(|c| *c != "*")
            .collect();
        let f1 = mk(model);
        let (tr1, c1) = run_scenario(chained(&f1), script.iter().map(|s| s.as_str()));
        let f2 = mk(model);
        let (tr2, c2) = run_scenario(chained(&f2), stripped);
        assert_eq!(c1, c2);
        assert_eq!(tr1.root(), tr2.root());
        check_result(&tr1, &c1);
    }
}

#[test]
fn test_deletion_restores_root() {
    let cases: &[(&[&str], &[&str])] = &[
        (&["a"], &["1", "*", "1/"]),
        (&["a", "ab", "abc"], &["ac", "*", "ac/"]),
        (&["a", "ab", "abc"], &["ac", "ac/"]),
        (&[], &["a", "a/"]),
        (&["a", "ab", "abc"], &["a/", "a"]),
        (&["a"], &["a/", "a"]),
        (&["a"], &["b", "b/"]),
        (&["a"], &["b", "*", "b/"]),
        (&["a", "bc"], &["1", "*", "2", "*", "3", "1/", "2/", "3/"]),
    ];
    for model in all_models() {
        for (init, script) in cases {
            let f = mk(model);
            let (tr, _) = run_scenario(chained(&f), init.iter().copied());
            let begin_root = tr.root().clone();
            let (tr, _) = run_scenario(tr, script.iter().copied());
            assert_eq!(
                tr.root(),
                &begin_root,
                "model {} init {:?} script {:?}",
                f.model.short_name(),
                init,
                script
            );
        }
    }
}

#[test]
fn test_iteration_order_is_deterministic() {
    for model in all_models() {
        let f = mk(model);
        let (tr, checklist) = run_scenario(
            chained(&f),
            ["a", "b", "c", "*", "a/", "klm", "qrstuv", "ab", "bcd"],
        );

        let reader =
            TrieReader::with_cache_limit(f.model.clone(), f.store.clone(), tr.root(), 0).unwrap();
        let mut pairs = Vec::new();
        reader
            .iterate(|k, v| {
                pairs.push((k.to_vec(), v.to_vec()));
                true
            })
            .unwrap();

        // the identity entry is yielded under the empty key
        assert!(pairs.contains(&(Vec::new(), IDENTITY.to_vec())));
        for (k, v) in &pairs {
            if k.is_empty() {
                continue;
            }
            assert_eq!(checklist.get(k), Some(v));
        }
        let live = checklist.values().filter(|v| !v.is_empty()).count();
        assert_eq!(pairs.len(), live + 1);

        // keys-only traversal visits the same keys in the same order
        let mut keys = Vec::new();
        reader
            .iterate_keys(|k| {
                keys.push(k.to_vec());
                true
            })
            .unwrap();
        let expected: Vec<Vec<u8>> = pairs.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, expected);

        // and the order is a function of the key set, not insertion order
        let f2 = mk(*f.model);
        let (tr2, _) = run_scenario(
            chained(&f2),
            ["bcd", "qrstuv", "klm", "c", "b", "ab", "a", "a/"],
        );
        let mut keys2 = Vec::new();
        tr2.iterate_keys(|k| {
            keys2.push(k.to_vec());
            true
        })
        .unwrap();
        assert_eq!(keys2, expected);
    }
}

#[test]
fn test_prefix_iteration() {
    let scenario = ["a", "ab", "c", "cd", "abcd", "klmn", "aaa", "abra", "111"];
    for model in all_models() {
        let f = mk(model);
        let (tr, _) = run_scenario(chained(&f), scenario);

        let mut found = Vec::new();
        tr.iterator(b"ab")
            .iterate(|k, v| {
                assert!(k.starts_with(b"ab"));
                assert_eq!(k.to_vec(), v.to_vec());
                found.push(String::from_utf8(k.to_vec()).unwrap());
                true
            })
            .unwrap();
        found.sort();
        assert_eq!(found, ["ab", "abcd", "abra"]);

        // empty prefix yields everything, including the identity
        let mut count = 0;
        tr.iterator(b"")
            .iterate(|_, _| {
                count += 1;
                true
            })
            .unwrap();
        assert_eq!(count, scenario.len() + 1);

        // a prefix matching nothing yields nothing
        tr.iterator(b"---")
            .iterate(|_, _| panic!("nothing should match"))
            .unwrap();

        assert!(tr.has_with_prefix(b"ab").unwrap());
        assert!(tr.has_with_prefix(b"klm").unwrap());
        assert!(!tr.has_with_prefix(b"zz").unwrap());
    }
}

#[test]
fn test_delete_prefix() {
    let scenario = ["a", "ab", "c", "cd", "abcd", "klmn", "aaa", "abra", "111"];
    for model in all_models() {
        let f = mk(model);
        let (mut tr, _) = run_scenario(chained(&f), scenario);
        assert!(tr.delete_prefix(b"a").unwrap());
        let tr = tr.commit_chained().unwrap();

        assert!(!tr.has_with_prefix(b"a").unwrap());
        assert_eq!(tr.get(b"").unwrap(), Some(IDENTITY.to_vec()));
        for key in ["c", "cd", "klmn", "111"] {
            assert!(tr.has(key.as_bytes()).unwrap(), "{key} must survive");
        }

        // deleting a prefix with no matches changes nothing
        let mut tr = tr;
        assert!(!tr.delete_prefix(b"zzz").unwrap());

        // the empty prefix clears everything but the identity
        assert!(tr.delete_prefix(b"").unwrap());
        let tr = tr.commit_chained().unwrap();
        assert_eq!(tr.get(b"").unwrap(), Some(IDENTITY.to_vec()));
        let mut remaining = 0;
        tr.iterate_keys(|_| {
            remaining += 1;
            true
        })
        .unwrap();
        assert_eq!(remaining, 1);
    }
}

#[test]
fn test_delete_prefix_restores_smaller_trie_root() {
    for model in all_models() {
        // the root after {c, cd} alone must match deleting the a-subtree
        // out of a larger trie
        let f1 = mk(model);
        let (tr1, _) = run_scenario(chained(&f1), ["c", "cd"]);

        let f2 = mk(model);
        let (mut tr2, _) = run_scenario(chained(&f2), ["a", "ab", "abc", "c", "cd"]);
        assert!(tr2.delete_prefix(b"a").unwrap());
        let tr2 = tr2.commit_chained().unwrap();
        assert_eq!(tr1.root(), tr2.root());
    }
}

#[test]
fn test_seeded_corpus_roundtrip() {
    for model in all_models() {
        let f = mk(model);
        let (tr, checklist) = run_scenario(
            chained(&f),
            seeded_scenario(42, 300).iter().map(|s| s.as_str()),
        );
        check_result(&tr, &checklist);

        // a reader reopened at the same root answers identically
        let reader = TrieReader::new(f.model.clone(), f.store.clone(), tr.root()).unwrap();
        check_result(&reader, &checklist);
    }
}

#[test]
fn test_snapshot_data_rebuilds_same_root() {
    for model in all_models() {
        let f = mk(model);
        let (tr, _) = run_scenario(
            chained(&f),
            [
                "a",
                "ab",
                "c",
                "cd",
                "abcd",
                "klmn",
                "aaa",
                "abra",
                "111",
                "big/0123456789012345678901234567890123456789",
            ],
        );

        let dump = Arc::new(InMemoryKvStore::new());
        tr.snapshot_data(&mut StoreWriter(&*dump)).unwrap();

        let f2 = mk(*f.model);
        let mut tr2 = chained(&f2);
        dump.iterator(b"").iterate(&mut |k, v| {
            if !k.is_empty() {
                tr2.update(k, v).unwrap();
            }
            true
        });
        let tr2 = tr2.commit_chained().unwrap();
        assert_eq!(tr.root(), tr2.root());
    }
}

#[test]
fn test_raw_snapshot_answers_identically() {
    for model in all_models() {
        let f = mk(model);
        let (tr, checklist) = run_scenario(
            chained(&f),
            seeded_scenario(13, 120).iter().map(|s| s.as_str()),
        );

        let dest = Arc::new(InMemoryKvStore::new());
        tr.snapshot(&mut StoreWriter(&*dest)).unwrap();

        let copy = TrieReader::new(f.model.clone(), dest, tr.root()).unwrap();
        check_result(&copy, &checklist);
        assert_eq!(copy.get(b"").unwrap(), Some(IDENTITY.to_vec()));
    }
}

#[test]
fn test_proof_roundtrip_and_soundness() {
    for model in all_models() {
        let f = mk(model);
        let keys = ["a", "ab", "abc", "klmn", "qp", "longkey0123456789"];
        let mut tr = chained(&f);
        for key in keys {
            tr.update(key.as_bytes(), key.repeat(9).as_bytes()).unwrap();
        }
        let tr = tr.commit_chained().unwrap();
        let root = tr.root().clone();

        for key in keys {
            let value = key.repeat(9);
            let proof = f.model.proof(key.as_bytes(), &tr).unwrap();
            proof
                .validate_with_value(&f.model, &root, value.as_bytes())
                .unwrap();

            // a different value must not verify
            assert!(proof
                .validate_with_value(&f.model, &root, b"different")
                .is_err());

            // serialization round-trips, and every byte matters
            let bytes = proof.to_bytes();
            let restored = unitrie::model::MerkleProof::from_bytes(&bytes).unwrap();
            assert_eq!(restored, proof);
            for i in 0..bytes.len() {
                let mut tampered = bytes.clone();
                tampered[i] ^= 0x01;
                let still_valid = unitrie::model::MerkleProof::from_bytes(&tampered)
                    .and_then(|p| p.validate_with_value(&f.model, &root, value.as_bytes()));
                assert!(still_valid.is_err(), "flip at byte {i} went unnoticed");
            }
        }

        // absence proofs validate as absence
        for missing in ["zz", "abz", "abcd"] {
            let proof = f.model.proof(missing.as_bytes(), &tr).unwrap();
            assert_eq!(
                proof.validate(&f.model, &root).unwrap(),
                ProvedStatus::Absence
            );
        }

        // a proof against the wrong root fails
        let proof = f.model.proof(b"a", &tr).unwrap();
        assert!(proof.validate(&f.model, &f.root).is_err());
    }
}

#[test]
fn test_readers_share_store_across_threads() {
    let f = mk(Blake2bModel::new(PathArity::Arity16, HashSize::H256));
    let (tr, checklist) = run_scenario(
        chained(&f),
        seeded_scenario(3, 100).iter().map(|s| s.as_str()),
    );
    let root = tr.root().clone();
    let checklist = Arc::new(checklist);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let model = f.model.clone();
        let store = f.store.clone();
        let root = root.clone();
        let checklist = checklist.clone();
        handles.push(std::thread::spawn(move || {
            let reader = TrieReader::new(model, store, &root).unwrap();
            check_result(&reader, &checklist);
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
}
