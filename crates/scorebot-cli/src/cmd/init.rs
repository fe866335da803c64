use anyhow::Context;
use scorebot_core::io::{self, Seeded};
use scorebot_core::{paths, Config};
use std::path::Path;

const SAMPLE_INVENTORY: &str = r#"# Services probed every round, grouped by team.
#
# teams:
#   - name: team1
#     services:
#       - name: db
#         host: 10.1.1.5
#         port: 5432
#         check: POSTGRESQLCheck
#         properties:
#           database: testdb
#           command: '\d'
#         accounts: [pwnbus]       # rotated per round; passwords live in credentials.yaml
#         timeout_seconds: 10      # optional, overrides the check default
#         expect: "List of relations"
teams:
  - name: team1
    services:
      - name: gateway
        host: 127.0.0.1
        check: ICMPCheck
"#;

const SAMPLE_CREDENTIALS: &str = r#"# team -> service -> username -> password
#
# teams:
#   team1:
#     db:
#       pwnbus: pwnbuspass
teams: {}
"#;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing scorebot in: {}", root.display());

    let dir = paths::scorebot_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("  {} {}", Seeded::Kept.label(), paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  {} {}", Seeded::Created.label(), paths::CONFIG_FILE);
    }

    let seeds = [
        (paths::INVENTORY_FILE, SAMPLE_INVENTORY),
        (paths::CREDENTIALS_FILE, SAMPLE_CREDENTIALS),
    ];
    for (rel, content) in seeds {
        let seeded = io::seed_file(&root.join(rel), content.as_bytes())
            .with_context(|| format!("failed to write {rel}"))?;
        println!("  {} {rel}", seeded.label());
    }

    // Credentials are secrets and the results db is local state.
    let added = io::ignore_in_git(root, &[paths::CREDENTIALS_FILE, paths::RESULTS_DB])
        .context("failed to update .gitignore")?;
    for entry in added {
        println!("  ignored: {entry}");
    }

    println!("\nEdit {} and run 'scorebot round' to probe once.", paths::INVENTORY_FILE);
    Ok(())
}
