//! User source: uid and login name of the executing process.

use async_trait::async_trait;
use serde_json::json;
use tributary_core::builtin_source;
use tributary_core::component::{Bundle, Component, ComponentContext, Source};
use tributary_core::{Error, Result};

#[derive(Debug, Default)]
pub struct UserSource;

impl Component for UserSource {}

#[async_trait]
impl Source for UserSource {
    async fn collect(&self, _ctx: &ComponentContext) -> Result<Bundle> {
        let mut entry = Bundle::new();

        #[cfg(unix)]
        {
            use nix::unistd::{getuid, User};

            let uid = getuid();
            entry.insert("uid".to_string(), json!(uid.as_raw()));

            let login = User::from_uid(uid)
                .map_err(|err| Error::Component(format!("unable to resolve uid {}: {}", uid, err)))?
                .map(|user| user.name);
            if let Some(login) = login {
                entry.insert("user".to_string(), json!(login));
            }
        }

        if !entry.contains_key("user") {
            if let Some(login) = std::env::var("USER")
                .ok()
                .or_else(|| std::env::var("USERNAME").ok())
            {
                entry.insert("user".to_string(), json!(login));
            }
        }

        if entry.is_empty() {
            return Err(Error::Component(
                "unable to determine the executing user".to_string(),
            ));
        }
        Ok(entry)
    }
}

builtin_source!("user", UserSource);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tributary_core::component::ComponentKind;

    #[tokio::test]
    #[cfg(unix)]
    async fn test_collects_uid_and_user() {
        let ctx = ComponentContext::for_component(
            &UserSource,
            ComponentKind::Source,
            "user",
            "who",
            0,
            false,
            None,
            &Map::new(),
        )
        .unwrap();

        let entry = UserSource.collect(&ctx).await.unwrap();
        assert!(entry["uid"].is_u64() || entry["uid"].is_i64());
    }
}
