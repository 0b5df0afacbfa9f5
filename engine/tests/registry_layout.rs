// Every step crate under `steps/` has exactly one registry entry, and the other way round.
use engine::registry::{default_registry, STEP_CATEGORIES};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};


fn steps_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("steps")
}

// `<category>/<subcategory>/<name>` for each directory holding a Cargo.toml
fn step_crates_on_disk(root: &Path) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for category in STEP_CATEGORIES {
        let Ok(subcategories) = fs::read_dir(root.join(category)) else { continue };
        for sub in subcategories.flatten().filter(|e| e.path().is_dir()) {
            for step in fs::read_dir(sub.path()).unwrap().flatten() {
                if step.path().join("Cargo.toml").is_file() {
                    found.insert(format!(
                        "{}/{}/{}",
                        category,
                        sub.file_name().to_string_lossy(),
                        step.file_name().to_string_lossy()
                    ));
                }
            }
        }
    }
    found
}

#[test]
fn registry_matches_step_directories() {
    let registry = default_registry().expect("registry builds");
    let registered: BTreeSet<String> = registry.paths().map(str::to_string).collect();
    let on_disk = step_crates_on_disk(&steps_root());

    let orphaned: Vec<_> = on_disk.difference(&registered).collect();
    let dangling: Vec<_> = registered.difference(&on_disk).collect();
    assert!(orphaned.is_empty(), "step crates without a registry entry: {:?}", orphaned);
    assert!(dangling.is_empty(), "registry entries without a step crate: {:?}", dangling);
    assert!(!on_disk.is_empty());
}
