//! Randomized mutation rounds: the output must always mirror the source

mod common;

use common::{Fixture, Upper};
use sift_core::is_ordered;
use sift_engine::{Engine, EngineOptions, ExecMode};
use std::collections::BTreeMap;

/// Small deterministic generator so failures reproduce
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

const DIRS: [&str; 4] = ["", "a", "a/b", "c"];
const NAMES: [&str; 4] = ["x.txt", "y.txt", "z.md", "w"];

fn mutate(fx: &Fixture, rng: &mut Lcg, round: usize) {
    for _ in 0..4 {
        let dir = DIRS[rng.below(DIRS.len() as u64) as usize];
        let name = NAMES[rng.below(NAMES.len() as u64) as usize];
        let rel = if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        };
        let path = fx.src.join(&rel);

        match rng.below(3) {
            0 if path.is_file() => fx.remove(&rel),
            0 if !dir.is_empty() && fx.src.join(dir).is_dir() && rng.below(4) == 0 => fx.remove(dir),
            _ if path.is_dir() => {}
            _ => {
                // A file where a directory is expected cannot hold children
                let blocked = rel
                    .match_indices('/')
                    .any(|(i, _)| fx.src.join(&rel[..i]).is_file());
                if !blocked {
                    fx.write(&rel, &format!("round {round} {rel}"));
                }
            }
        }
    }
}

fn expected(fx: &Fixture) -> BTreeMap<String, Option<String>> {
    fx.src_tree()
        .into_iter()
        .map(|(path, contents)| (path, contents.map(|c| c.to_uppercase())))
        .collect()
}

async fn run_rounds(mode: ExecMode, seed: u64) {
    let fx = Fixture::new();
    let mut rng = Lcg(seed);
    let opts = EngineOptions::new(&fx.src, &fx.out, 3).mode(mode);
    let mut engine = Engine::new(Upper::new().shared(), opts).unwrap();

    for round in 0..25 {
        mutate(&fx, &mut rng, round);
        let report = engine.build().await.unwrap();
        assert!(is_ordered(&report.patches), "round {round}: {:?}", report.patches);
        assert_eq!(fx.out_tree(), expected(&fx), "round {round}");

        let idle = engine.build().await.unwrap();
        assert!(idle.patches.is_empty(), "round {round}: {:?}", idle.patches);
    }
}

#[tokio::test]
async fn sync_rounds_mirror_source() {
    run_rounds(ExecMode::Sync, 7).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn async_rounds_mirror_source() {
    run_rounds(ExecMode::Async, 42).await;
}
