use std::env;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";

/// Environment variables checked for the API key, in order
const API_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];
const BASE_URL_VAR: &str = "GEMINI_BASE_URL";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    /// Variable the key came from, for the startup log line
    pub api_key_source: Option<&'static str>,
    pub base_url: String,
}

impl Config {
    /// Read configuration once from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let (api_key_source, api_key) = API_KEY_VARS
            .iter()
            .find_map(|name| non_empty(*name).map(|key| (*name, key)))
            .unzip();
        let base_url = non_empty(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            api_key,
            api_key_source,
            base_url,
        }
    }
}
