//! Executor metadata and environment properties derived at run end.
//!
//! Environment lookups happen only when [`populate_executor`] and
//! [`environment_properties`] are called, never earlier.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::Executor;

pub const EXECUTOR_NAME: &str = "ALLURE_EXECUTOR_NAME";
pub const EXECUTOR_TYPE: &str = "ALLURE_EXECUTOR_TYPE";
pub const EXECUTOR_URL: &str = "ALLURE_EXECUTOR_URL";
pub const EXECUTOR_BUILD_ORDER: &str = "ALLURE_EXECUTOR_BUILD_ORDER";
pub const EXECUTOR_BUILD_NAME: &str = "ALLURE_EXECUTOR_BUILD_NAME";
pub const EXECUTOR_BUILD_URL: &str = "ALLURE_EXECUTOR_BUILD_URL";
pub const EXECUTOR_REPORT_NAME: &str = "ALLURE_EXECUTOR_REPORT_NAME";
pub const EXECUTOR_REPORT_URL: &str = "ALLURE_EXECUTOR_REPORT_URL";

/// Default prefix of keys exported as environment properties.
pub const ENV_PREFIX: &str = "ALLURE_ENV_";

/// External key-value source.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;

    /// All pairs, ordered by key.
    fn vars(&self) -> Vec<(String, String)>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    /// Pairs whose key or value is not valid UTF-8 are skipped.
    fn vars(&self) -> Vec<(String, String)> {
        let mut vars: Vec<_> = std::env::vars_os()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (key, _) => {
                    debug!(key = ?key, "skipping non UTF-8 environment variable");
                    None
                }
            })
            .collect();
        vars.sort();
        vars
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Fill every executor field from `env` when the caller left the name empty.
///
/// An unparsable build order becomes zero.
pub fn populate_executor(executor: Executor, env: &dyn EnvSource) -> Executor {
    if !executor.name.is_empty() {
        return executor;
    }

    let get = |key: &str| env.var(key).unwrap_or_default();
    let build_order = get(EXECUTOR_BUILD_ORDER).trim().parse().unwrap_or(0);

    let populated = Executor {
        name: get(EXECUTOR_NAME),
        executor_type: get(EXECUTOR_TYPE),
        url: get(EXECUTOR_URL),
        build_order,
        build_name: get(EXECUTOR_BUILD_NAME),
        build_url: get(EXECUTOR_BUILD_URL),
        report_name: get(EXECUTOR_REPORT_NAME),
        report_url: get(EXECUTOR_REPORT_URL),
    };

    debug!(
        name = populated.name.as_str(),
        build_order = populated.build_order,
        "executor populated from environment"
    );
    populated
}

/// `KEY=VALUE` lines for every key carrying `prefix`, prefix stripped.
pub fn environment_properties(env: &dyn EnvSource, prefix: &str) -> Vec<String> {
    env.vars()
        .into_iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .filter(|stripped| !stripped.is_empty())
                .map(|stripped| format!("{stripped}={value}"))
        })
        .collect()
}
