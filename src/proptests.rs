use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::HashMap;

fn text_strategy() -> impl Strategy<Value = String> {
    // Mostly a tiny alphabet so paths share prefixes and tables fill up.
    prop_oneof![
        4 => "[a-d]{0,6}",
        2 => prop::collection::vec(
            prop::sample::select(vec!['a', 'b', '%', 'é', '🦀', '\n', '~']),
            0..10,
        )
        .prop_map(|chars| chars.into_iter().collect::<String>()),
        1 => any::<String>(),
    ]
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    #[proptest(weight = 6)]
    Insert(#[proptest(strategy = "text_strategy()")] String),
    #[proptest(weight = 3)]
    Lookup(#[proptest(strategy = "text_strategy()")] String),
    Resolve(u32),
}

/// Model of the pool: interned text and the handle it was given.
#[derive(Default)]
struct Model {
    by_text: HashMap<String, Handle>,
    by_handle: HashMap<Handle, String>,
}

fn small_segments() -> Config {
    Config::new().with_segment_size(64).with_recycle_window(2)
}

fn sorted_by_encoding(texts: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut texts: Vec<String> = texts.into_iter().collect();
    texts.sort_by_key(|t| PercentCodec.encode(t).into_owned());
    texts
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 10_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_model(ops in prop::collection::vec(any::<Op>(), 0..=400)) {
        let mut pool = StringPool::with_config(small_segments()).unwrap();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Insert(text) => {
                    let handle = pool.insert(&text).unwrap();
                    prop_assert_ne!(handle.as_u32(), 0);
                    match model.by_text.get(&text) {
                        Some(&known) => prop_assert_eq!(handle, known),
                        None => {
                            // A new string never reuses another string's handle.
                            prop_assert!(!model.by_handle.contains_key(&handle));
                            model.by_text.insert(text.clone(), handle);
                            model.by_handle.insert(handle, text.clone());
                        }
                    }
                    prop_assert_eq!(pool.resolve(handle).unwrap(), text);
                }
                Op::Lookup(text) => {
                    let got = pool.lookup(&text).unwrap();
                    prop_assert_eq!(got, model.by_text.get(&text).copied());
                }
                Op::Resolve(raw) => {
                    let handle = Handle::from_raw(raw);
                    match model.by_handle.get(&handle) {
                        Some(text) => prop_assert_eq!(&pool.resolve(handle).unwrap(), text),
                        // Arbitrary values must come back as errors or text, never a panic.
                        None => {
                            let _ = pool.resolve(handle);
                        }
                    }
                }
            }
            prop_assert_eq!(pool.len(), model.by_text.len());
        }

        pool.validate();
        let got: Vec<String> = pool.handles().map(|h| pool.resolve(h).unwrap()).collect();
        prop_assert_eq!(got, sorted_by_encoding(model.by_text.keys().cloned()));
    }

    #[test]
    fn prop_roundtrip_any_text(texts in prop::collection::vec(any::<String>(), 1..50)) {
        let mut pool = StringPool::new(128);
        let handles: Vec<Handle> = texts.iter().map(|t| pool.insert(t).unwrap()).collect();
        for (text, handle) in texts.iter().zip(&handles) {
            prop_assert_eq!(&pool.resolve(*handle).unwrap(), text);
            prop_assert_eq!(pool.insert(text).unwrap(), *handle);
        }
        pool.validate();
    }
}

#[test]
fn test_randomized_workload() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(7);
    let mut pool = StringPool::with_config(small_segments()).unwrap();
    let mut model: HashMap<String, Handle> = HashMap::new();

    for _ in 0..20_000 {
        let len = rng.gen_range(0..12);
        let text: String = (0..len)
            .map(|_| match rng.gen_range(0..10) {
                0 => rng.gen::<char>(),
                _ => rng.gen_range(b' '..=b'~') as char,
            })
            .collect();

        if rng.gen_bool(0.7) {
            let handle = pool.insert(&text).unwrap();
            assert_eq!(*model.entry(text.clone()).or_insert(handle), handle);
        } else {
            assert_eq!(pool.lookup(&text).unwrap(), model.get(&text).copied());
        }
    }

    assert_eq!(pool.len(), model.len());
    for (text, handle) in &model {
        assert_eq!(pool.resolve(*handle).unwrap(), *text);
    }
    pool.validate();
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

#[test]
fn exhaustive_insert_order_small_set() {
    let words = ["", "a", "b", "ab", "ba", "aé"];

    for_each_permutation(&words, |perm| {
        let mut pool = StringPool::new(32);
        let handles: Vec<Handle> = perm.iter().map(|w| pool.insert(w).unwrap()).collect();

        for (word, handle) in perm.iter().zip(&handles) {
            assert_eq!(pool.resolve(*handle).unwrap(), *word);
            assert_eq!(pool.lookup(word).unwrap(), Some(*handle));
        }
        assert_eq!(pool.len(), words.len());
        pool.validate();

        let got: Vec<String> = pool.handles().map(|h| pool.resolve(h).unwrap()).collect();
        let expected = sorted_by_encoding(words.iter().map(|w| w.to_string()));
        assert_eq!(got, expected);
    });
}
