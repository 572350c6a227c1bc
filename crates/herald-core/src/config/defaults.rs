//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "herald".to_string()
}

pub fn default_data_dir() -> String {
    "~/.herald".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_zulip_site() -> String {
    "https://chat.zulip.org".to_string()
}

pub fn default_arxiv_db_file() -> String {
    "~/.herald/data/arxiv.json".to_string()
}

pub fn default_arxiv_api_url() -> String {
    "https://export.arxiv.org/api/query".to_string()
}

pub fn default_digest_hour() -> u32 {
    7
}

pub fn default_max_results() -> usize {
    10
}

pub fn default_min_interval_secs() -> u64 {
    3
}

pub fn default_kita_db_file() -> String {
    "~/.herald/data/kita.db".to_string()
}

pub fn default_kita_model() -> String {
    "o4-mini".to_string()
}

pub fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

pub fn default_max_tokens() -> i64 {
    1_000_000
}

pub fn default_memory_window() -> usize {
    10
}

pub fn default_max_completion_tokens() -> u32 {
    1000
}
