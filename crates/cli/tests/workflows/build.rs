//! build, watch and clean against real project trees

use crate::common::TestProject;
use crate::sift;
use anyhow::Result;

fn count(report: &serde_json::Value, stat: &str) -> u64 {
    report["stats"][stat].as_u64().unwrap_or(u64::MAX)
}

#[test]
fn build_uppercases_and_reports_json() -> Result<()> {
    let project = TestProject::new();
    project.write("src/a.txt", "hi");
    project.write("src/notes/b.txt", "there");
    let cache = project.cache_env();

    let result = sift!(project.root(), "build", "--json")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?;
    let report = result.report()?;

    let ops: Vec<(&str, &str)> = report["patches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["op"].as_str().unwrap(), p["path"].as_str().unwrap()))
        .collect();
    assert_eq!(
        ops,
        vec![
            ("create", "a.txt"),
            ("mkdir", "notes"),
            ("create", "notes/b.txt"),
        ]
    );
    assert_eq!(report["reset"], true);
    assert_eq!(count(&report, "cache_primes"), 2);
    assert_eq!(project.read("dist/a.txt"), "HI");
    assert_eq!(project.read("dist/notes/b.txt"), "THERE");
    assert!(!project.exists(".dist.sift.lock"));
    Ok(())
}

#[test]
fn second_process_is_served_from_cache() -> Result<()> {
    let project = TestProject::new();
    project.write("src/a.txt", "hi");
    let cache = project.cache_env();

    sift!(project.root(), "build", "--json")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?;
    let report = sift!(project.root(), "build", "--json")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?
        .report()?;

    assert_eq!(count(&report, "cache_hits"), 1);
    assert_eq!(project.read("dist/a.txt"), "HI");

    let uncached = sift!(project.root(), "build", "--json", "--no-cache")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?
        .report()?;
    assert_eq!(count(&uncached, "cache_hits"), 0);
    Ok(())
}

#[test]
fn ci_disables_persistence_unless_forced() -> Result<()> {
    let project = TestProject::new();
    project.write("src/a.txt", "hi");
    let cache = project.cache_env();

    for _ in 0..2 {
        let report = sift!(project.root(), "build", "--json")
            .env("SIFT_CACHE_ROOT", &cache)
            .env("CI", "true")
            .assert_success()?
            .report()?;
        assert_eq!(count(&report, "cache_hits"), 0);
    }
    assert!(!project.cache_root().exists());

    let mut hits = Vec::new();
    for _ in 0..2 {
        let report = sift!(project.root(), "build", "--json")
            .env("SIFT_CACHE_ROOT", &cache)
            .env("CI", "true")
            .env("FORCE_PERSISTENCE_IN_CI", "1")
            .assert_success()?
            .report()?;
        hits.push(count(&report, "cache_hits"));
    }
    assert_eq!(hits, vec![0, 1]);
    Ok(())
}

#[test]
fn include_filter_tracks_partials() -> Result<()> {
    let project = TestProject::new();
    project.write("sift.toml", "[filter]\nname = \"include\"\nextensions = [\"html\"]\n");
    project.write("src/index.html", "<html>\n@include \"partials/nav.txt\"\n</html>\n");
    project.write("src/partials/nav.txt", "<nav/>\n");
    let cache = project.cache_env();

    sift!(project.root(), "build", "--json")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?;
    assert_eq!(project.read("dist/index.html"), "<html>\n<nav/>\n</html>\n");
    assert_eq!(project.read("dist/partials/nav.txt"), "<nav/>\n");

    // Only the partial changes; the cached page must not be reused
    project.write("src/partials/nav.txt", "<nav>v2</nav>\n");
    let report = sift!(project.root(), "build", "--json")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?
        .report()?;

    assert_eq!(count(&report, "cache_hits"), 0);
    assert_eq!(project.read("dist/index.html"), "<html>\n<nav>v2</nav>\n</html>\n");
    Ok(())
}

#[test]
fn failed_build_names_the_file() -> Result<()> {
    let project = TestProject::new();
    project.write("src/page.txt", "@include \"missing.txt\"\n");

    let result = sift!(project.root(), "build", "--filter", "include", "--no-cache").assert_failure()?;
    assert!(result.contains_stderr("page.txt"), "stderr: {}", result.stderr);
    assert!(result.contains_stderr("missing.txt"), "stderr: {}", result.stderr);
    Ok(())
}

#[test]
fn unknown_filter_is_rejected() -> Result<()> {
    let project = TestProject::new();
    let result = sift!(project.root(), "build", "--filter", "sass").assert_failure()?;
    assert!(result.contains_stderr("sass"), "stderr: {}", result.stderr);
    Ok(())
}

#[test]
fn explicit_paths_and_jobs() -> Result<()> {
    let project = TestProject::new();
    for i in 0..8 {
        project.write(&format!("site/page{i}.txt"), &format!("page {i}"));
    }

    let result = sift!(
        project.root(),
        "build",
        "--input",
        "site",
        "--output",
        "out/public",
        "--jobs",
        "3",
        "--no-cache"
    )
    .assert_success()?;

    assert!(result.contains_stdout("Applied"));
    assert_eq!(project.read("out/public/page5.txt"), "PAGE 5");
    Ok(())
}

#[test]
fn watch_builds_then_idles() -> Result<()> {
    let project = TestProject::new();
    project.write("src/a.txt", "watched");

    let result = sift!(
        project.root(),
        "watch",
        "--json",
        "--no-cache",
        "--interval-ms",
        "20",
        "--max-cycles",
        "3"
    )
    .assert_success()?;

    // Only the first poll has anything to report
    let report = result.report()?;
    assert_eq!(report["patches"].as_array().unwrap().len(), 1);
    assert_eq!(project.read("dist/a.txt"), "WATCHED");
    Ok(())
}

#[test]
fn clean_removes_cache() -> Result<()> {
    let project = TestProject::new();
    project.write("src/a.txt", "hi");
    let cache = project.cache_env();

    sift!(project.root(), "build")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?;
    assert!(project.cache_root().join("objects").is_dir());

    let result = sift!(project.root(), "clean")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?;
    assert!(result.contains_stdout("Removed"));
    assert!(!project.cache_root().exists());

    let again = sift!(project.root(), "clean")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?;
    assert!(again.contains_stdout("Nothing to clean"));
    Ok(())
}

#[test]
fn clean_refuses_foreign_directory() -> Result<()> {
    let project = TestProject::new();
    project.write("src/keep.txt", "precious");
    let src = project.root().join("src").display().to_string();

    sift!(project.root(), "clean")
        .env("SIFT_CACHE_ROOT", &src)
        .assert_failure()?;
    assert_eq!(project.read("src/keep.txt"), "precious");
    Ok(())
}
