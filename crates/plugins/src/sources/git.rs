//! Git source: repository root, branch and revision.
//!
//! Shells out to the `git` binary, like any other consumer of repository
//! state. Fails when `git` is unavailable or the directory is not inside a
//! repository.

use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;
use tributary_core::builtin_source;
use tributary_core::component::{Bundle, Component, ComponentContext, Source};
use tributary_core::config::{ConfigOption, Configurator, Schema};
use tributary_core::{Error, Result};

#[derive(Debug, Default)]
pub struct GitSource;

impl Component for GitSource {
    fn declare_config(&self, config: &mut Configurator) -> Result<()> {
        config.declare(
            ConfigOption::new("directory")
                .optional()
                .default(json!("."))
                .schema(Schema::string().non_empty()),
        )?;
        Ok(())
    }
}

#[async_trait]
impl Source for GitSource {
    async fn collect(&self, ctx: &ComponentContext) -> Result<Bundle> {
        let directory = ctx.config.get_str("directory")?;

        let root = git(directory, &["rev-parse", "--show-toplevel"]).await?;
        let branch = git(directory, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let rev = git(directory, &["rev-parse", "--short", "--verify", "HEAD"]).await?;

        // The tag lookup is the only one allowed to fail: most revisions
        // simply are not tagged
        let tag = git(directory, &["describe", "--tags", "--exact-match", "HEAD"])
            .await
            .unwrap_or_default();

        let mut entry = Bundle::new();
        entry.insert("root".to_string(), json!(root));
        entry.insert("branch".to_string(), json!(branch));
        entry.insert("rev".to_string(), json!(rev));
        entry.insert("tag".to_string(), json!(tag));
        Ok(entry)
    }
}

async fn git(directory: &str, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(directory)
        .args(args)
        .output()
        .await
        .map_err(|err| Error::Component(format!("unable to run git: {}", err)))?;

    if !output.status.success() {
        return Err(Error::Component(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

builtin_source!("git", GitSource);
