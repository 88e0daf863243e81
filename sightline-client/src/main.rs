//! sightline - command-line client for the Sightline backend
//!
//! `voice` mode reads finalized speech results one per line from stdin
//! and drives the same actions the other subcommands perform.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sightline_common::api::{HistoryItemResponse, SignupRequest, UpdateUserRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sightline_client::settings::default_settings_path;
use sightline_client::upload::{upload_and_wait, UploadTracker};
use sightline_client::voice::{ConsoleSpeaker, Field, Outcome, Page, Speaker, VoiceCommand, VoiceDispatcher};
use sightline_client::{ApiClient, AppSettings, ClientConfig, ClientError};

#[derive(Parser, Debug)]
#[command(name = "sightline")]
#[command(about = "Street scene narration client")]
#[command(version)]
struct Cli {
    /// Client config file (default: ~/.config/sightline/client.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Settings file (default: ~/.config/sightline/settings.toml)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Credentials {
    /// Username or email
    #[arg(long, env = "SIGHTLINE_USER")]
    user: String,

    #[arg(long, env = "SIGHTLINE_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        language: Option<String>,
    },
    /// Upload a video or photo and wait for the narration
    Upload {
        file: PathBuf,
        #[command(flatten)]
        credentials: Credentials,
        /// Narration language (default: settings language)
        #[arg(long)]
        language: Option<String>,
    },
    /// List past detections, newest first
    History {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Delete a history entry by id
    Delete {
        id: i64,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Change profile fields
    Profile {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Voice control from stdin, one phrase per line
    Voice {
        /// File used by "choose file"
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("sightline_client={}", cli.log_level))),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::load(cli.config.as_deref()).context("Failed to load client config")?;
    let settings_path = match cli.settings.clone().or_else(default_settings_path) {
        Some(path) => path,
        None => bail!("No settings location available; pass --settings"),
    };
    let mut settings = AppSettings::load(&settings_path).context("Failed to load settings")?;
    let client = ApiClient::new(&config)?;
    let speaker: Arc<dyn Speaker> = Arc::new(ConsoleSpeaker);

    match cli.command {
        Command::Signup {
            username,
            email,
            password,
            language,
        } => {
            let user = client
                .signup(&SignupRequest {
                    username,
                    email,
                    password,
                    language,
                })
                .await?;
            println!("Created user {} (id {})", user.username, user.id);
        }
        Command::Upload {
            file,
            credentials,
            language,
        } => {
            login(&client, &credentials).await?;
            let language = language.unwrap_or_else(|| settings.language.clone());
            let mut tracker = UploadTracker::new();
            let last = upload_and_wait(
                &client,
                &mut tracker,
                speaker.as_ref(),
                &file,
                Some(language.as_str()),
                Duration::from_millis(config.poll_interval_ms),
            )
            .await?;
            match last.history_id {
                Some(id) => print_entry(&client, &client.history_entry(id).await?).await,
                None => bail!("Detection failed: {}", last.message),
            }
        }
        Command::History { credentials } => {
            login(&client, &credentials).await?;
            let entries = client.history().await?;
            if entries.is_empty() {
                println!("No history yet");
            }
            for entry in &entries {
                print_entry(&client, entry).await;
            }
        }
        Command::Delete { id, credentials } => {
            login(&client, &credentials).await?;
            client.delete_entry(id).await?;
            println!("Deleted entry {}", id);
        }
        Command::Profile {
            credentials,
            username,
            email,
            language,
        } => {
            login(&client, &credentials).await?;
            let user = client
                .update_profile(&UpdateUserRequest {
                    username,
                    email,
                    language,
                    password: None,
                })
                .await?;
            println!("{} <{}> language {}", user.username, user.email, user.language);
        }
        Command::Voice { file } => {
            let mut session = VoiceSession::new(client, speaker.clone(), file, config.poll_interval_ms);
            session.run(&mut settings, &settings_path).await?;
        }
    }
    Ok(())
}

async fn login(client: &ApiClient, credentials: &Credentials) -> Result<()> {
    client
        .login(&credentials.user, &credentials.password)
        .await
        .context("Login failed")?;
    Ok(())
}

async fn print_entry(client: &ApiClient, entry: &HistoryItemResponse) {
    println!("#{} {} [{}] {}", entry.id, entry.timestamp, entry.media_type, entry.language);
    for line in &entry.results {
        println!("    {}", line);
    }
    for url in [&entry.audio_url, &entry.video_url, &entry.image_url].into_iter().flatten() {
        let shown = client.absolute_url(url).await.unwrap_or_else(|| url.clone());
        println!("    {}", shown);
    }
}

/// State behind voice mode: form fields, chosen file, last results
struct VoiceSession {
    client: ApiClient,
    speaker: Arc<dyn Speaker>,
    dispatcher: VoiceDispatcher,
    file: Option<PathBuf>,
    chosen: Option<PathBuf>,
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    results: Vec<String>,
    poll_interval: Duration,
}

impl VoiceSession {
    fn new(client: ApiClient, speaker: Arc<dyn Speaker>, file: Option<PathBuf>, poll_interval_ms: u64) -> Self {
        Self {
            dispatcher: VoiceDispatcher::new(speaker.clone(), Page::Login),
            client,
            speaker,
            file,
            chosen: None,
            username: None,
            email: None,
            password: None,
            results: Vec::new(),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    async fn run(&mut self, settings: &mut AppSettings, settings_path: &std::path::Path) -> Result<()> {
        self.dispatcher.start(Instant::now(), settings);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        while self.dispatcher.is_listening() {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    let before = settings.clone();
                    self.dispatcher.push_result(line);
                    for outcome in self.dispatcher.drain(Instant::now(), settings) {
                        if let Outcome::Executed(cmd) = outcome {
                            self.perform(cmd, settings).await;
                        }
                    }
                    if *settings != before {
                        if let Err(e) = settings.save(settings_path) {
                            warn!(error = %e, "Failed to save settings");
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.dispatcher.tick(Instant::now(), settings);
                }
            }
        }
        info!("Voice session ended");
        Ok(())
    }

    /// Carry out commands the dispatcher hands back
    async fn perform(&mut self, cmd: VoiceCommand, settings: &AppSettings) {
        let result = match cmd {
            VoiceCommand::Fill { field, value } => {
                let slot = match field {
                    Field::Username => &mut self.username,
                    Field::Email => &mut self.email,
                    Field::Password => &mut self.password,
                };
                *slot = Some(value);
                self.speaker.speak("Got it.");
                Ok(())
            }
            VoiceCommand::Submit => self.submit(settings).await,
            VoiceCommand::ChooseFile => {
                match &self.file {
                    Some(file) => {
                        self.chosen = Some(file.clone());
                        self.speaker.speak(&format!("Selected {}.", file.display()));
                    }
                    None => self.speaker.speak("No file was given to choose from."),
                }
                Ok(())
            }
            VoiceCommand::StartUpload => self.start_upload(settings).await,
            VoiceCommand::ReadResults => {
                if self.results.is_empty() {
                    self.speaker.speak("There are no results yet.");
                }
                for line in &self.results {
                    self.speaker.speak(line);
                }
                Ok(())
            }
            VoiceCommand::OpenEntry(n) => self.open_entry(n, settings).await,
            VoiceCommand::DeleteEntry(n) => self.delete_entry(n).await,
            VoiceCommand::Play | VoiceCommand::Replay => {
                self.speaker
                    .speak(&format!("Playing at speed {}.", settings.playback_rate));
                Ok(())
            }
            VoiceCommand::Pause => {
                self.speaker.speak("Paused.");
                Ok(())
            }
            VoiceCommand::Stop => {
                self.speaker.speak("Stopped.");
                Ok(())
            }
            VoiceCommand::Logout => {
                self.client.logout().await;
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            match e {
                ClientError::Unauthorized(_) | ClientError::NoSession => {
                    self.speaker.speak("Please log in again.");
                    self.dispatcher.navigate(Page::Login, settings);
                }
                other => self.speaker.speak(&format!("Sorry, that failed. {}", other)),
            }
        }
    }

    async fn submit(&mut self, settings: &AppSettings) -> sightline_client::Result<()> {
        match self.dispatcher.page() {
            Page::Login => {
                let (Some(user), Some(password)) = (&self.username, &self.password) else {
                    self.speaker.speak("Say your username and password first.");
                    return Ok(());
                };
                let user = self.client.login(user, password).await?;
                self.speaker.speak(&format!("Welcome, {}.", user.username));
                self.dispatcher.navigate(Page::Home, settings);
            }
            Page::Signup => {
                let (Some(username), Some(email), Some(password)) =
                    (&self.username, &self.email, &self.password)
                else {
                    self.speaker.speak("Say your username, email and password first.");
                    return Ok(());
                };
                self.client
                    .signup(&SignupRequest {
                        username: username.clone(),
                        email: email.clone(),
                        password: password.clone(),
                        language: Some(settings.language.clone()),
                    })
                    .await?;
                self.client.login(username, password).await?;
                self.speaker.speak("Account created.");
                self.dispatcher.navigate(Page::Home, settings);
            }
            Page::Profile => {
                self.client
                    .update_profile(&UpdateUserRequest {
                        username: self.username.clone(),
                        email: self.email.clone(),
                        language: Some(settings.language.clone()),
                        password: self.password.clone(),
                    })
                    .await?;
                self.speaker.speak("Profile saved.");
            }
            _ => {}
        }
        Ok(())
    }

    async fn start_upload(&mut self, settings: &AppSettings) -> sightline_client::Result<()> {
        let Some(file) = self.chosen.clone() else {
            self.speaker.speak("Choose a file first.");
            return Ok(());
        };
        let mut tracker = UploadTracker::new();
        let last = upload_and_wait(
            &self.client,
            &mut tracker,
            self.speaker.as_ref(),
            &file,
            Some(settings.language.as_str()),
            self.poll_interval,
        )
        .await?;
        if let Some(id) = last.history_id {
            self.results = self.client.history_entry(id).await?.results;
            self.dispatcher.navigate(Page::Results, settings);
        }
        Ok(())
    }

    async fn nth_entry(&self, n: usize) -> sightline_client::Result<Option<HistoryItemResponse>> {
        let entries = self.client.history().await?;
        Ok(entries.into_iter().nth(n - 1))
    }

    async fn open_entry(&mut self, n: usize, settings: &AppSettings) -> sightline_client::Result<()> {
        match self.nth_entry(n).await? {
            Some(entry) => {
                self.results = entry.results;
                self.dispatcher.navigate(Page::Results, settings);
                for line in &self.results {
                    self.speaker.speak(line);
                }
            }
            None => self.speaker.speak(&format!("There is no entry {}.", n)),
        }
        Ok(())
    }

    async fn delete_entry(&mut self, n: usize) -> sightline_client::Result<()> {
        match self.nth_entry(n).await? {
            Some(entry) => {
                self.client.delete_entry(entry.id).await?;
                self.speaker.speak(&format!("Entry {} deleted.", n));
            }
            None => self.speaker.speak(&format!("There is no entry {}.", n)),
        }
        Ok(())
    }
}
