//! Random worker names and node UUIDs.

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

const WORKER_NAME_WORDS: &[&str] = &[
    "amber", "arrow", "aurora", "birch", "blaze", "breeze", "canyon", "cedar", "cloud", "comet",
    "coral", "crane", "dawn", "delta", "drift", "echo", "ember", "falcon", "fern", "flint",
    "frost", "glade", "harbor", "hazel", "iris", "jade", "lark", "lotus", "lunar", "maple",
    "meadow", "mist", "nova", "oak", "orbit", "pearl", "pine", "pixel", "quartz", "raven",
    "ridge", "river", "sage", "shadow", "sierra", "solar", "spark", "storm", "summit", "swift",
    "thunder", "tide", "vale", "willow", "zephyr",
];

/// Exclusive upper bound of the numeric suffix in generated names.
const NAME_SUFFIX_LIMIT: u32 = 1000;

/// `word-word-N` with `N < 1000`.
pub fn generate_worker_name() -> String {
    generate_worker_name_with(&mut rand::thread_rng())
}

/// `word-word`; bulk runs append `-1`, `-2`, ...
pub fn generate_worker_name_base() -> String {
    generate_worker_name_base_with(&mut rand::thread_rng())
}

/// Random v4 UUID for the VLESS node.
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

pub fn generate_worker_name_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let base = generate_worker_name_base_with(rng);
    format!("{base}-{}", rng.gen_range(0..NAME_SUFFIX_LIMIT))
}

pub fn generate_worker_name_base_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = WORKER_NAME_WORDS.choose(rng).copied().unwrap_or("worker");
    let second = WORKER_NAME_WORDS.choose(rng).copied().unwrap_or("node");
    format!("{first}-{second}")
}
