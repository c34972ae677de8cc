use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TEMPLATES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");

#[derive(Parser, Debug, Clone)]
#[command(name = "showreel")]
#[command(about = "Portfolio site for projects, team and comments")]
#[command(version)]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080", env = "SHOWREEL_BIND")]
    pub bind: String,

    /// Directory of the local database; a temporary one is used when absent
    #[arg(long, env = "SHOWREEL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Static site document that seeds local storage
    #[arg(long, default_value = "data/data.json", env = "SHOWREEL_SEED")]
    pub seed: PathBuf,

    /// Base URL of the remote document store; selects the remote backend
    #[arg(long, env = "SHOWREEL_REMOTE_URL")]
    pub remote_url: Option<String>,

    #[arg(long, env = "SHOWREEL_REMOTE_API_KEY")]
    pub remote_api_key: Option<String>,

    /// Upper bound for every backend call
    #[arg(long, default_value_t = 10, env = "SHOWREEL_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    #[arg(long, default_value = DEFAULT_TEMPLATES, env = "SHOWREEL_TEMPLATES")]
    pub templates: PathBuf,

    /// Only send the session cookie over HTTPS
    #[arg(long, env = "SHOWREEL_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Emails allowed to register with the admin role
    #[arg(long = "admin-email", env = "SHOWREEL_ADMIN_EMAILS", value_delimiter = ',')]
    pub admin_emails: Vec<String>,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn open_db(&self) -> sled::Result<sled::Db> {
        match &self.data_dir {
            Some(dir) => sled::open(dir),
            None => sled::Config::new().temporary(true).open(),
        }
    }
}
