//! config show / example

use crate::common::TestProject;
use crate::sift;
use anyhow::Result;

#[test]
fn example_round_trips_through_show() -> Result<()> {
    let project = TestProject::new();

    let example = sift!(project.root(), "config", "example").assert_success()?;
    assert!(example.contains_stdout("[build]"));
    project.write("sift.toml", &example.stdout);

    let shown = sift!(project.root(), "config", "show").assert_success()?;
    assert!(shown.contains_stdout("sift.toml"));
    assert!(shown.contains_stdout("[filter]"));
    assert!(shown.contains_stdout("\"include\""));
    Ok(())
}

#[test]
fn show_reports_environment_overrides() -> Result<()> {
    let project = TestProject::new();
    let cache = project.cache_env();

    let shown = sift!(project.root(), "config", "show")
        .env("JOBS", "7")
        .env("SIFT_CACHE_ROOT", &cache)
        .assert_success()?;
    assert!(shown.contains_stdout("(defaults)"));
    assert!(shown.contains_stdout(&cache));
    assert!(shown.stdout.contains(" = 7"), "stdout: {}", shown.stdout);
    Ok(())
}

#[test]
fn invalid_config_file_fails() -> Result<()> {
    let project = TestProject::new();
    project.write("custom.toml", "[build]\nconcurrency = 0\n");

    let result = sift!(project.root(), "--config", "custom.toml", "config", "show").assert_failure()?;
    assert!(result.contains_stderr("concurrency"), "stderr: {}", result.stderr);

    let missing = sift!(project.root(), "config", "show", "--config", "absent.toml").assert_failure()?;
    assert!(missing.contains_stderr("absent.toml"), "stderr: {}", missing.stderr);
    Ok(())
}
