use crate::config::{CatalogSourceKind, Config, SpeedTestConfig};
use crate::i18n::{
    CatalogSource, DirectoryCatalogSource, EmbeddedCatalogSource, HttpCatalogSource,
    SelectOutcome, Translator,
};
use crate::page::Page;
use crate::speedtest::{ChannelSink, DisplayEvent, RunOutcome, Sequencer};
use crate::storage::{FilePreferenceStore, PreferenceStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

const CATALOG_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A user action in an interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Restart,
    ToggleMoreInfo,
    SelectLocale(String),
    Quit,
}

impl Command {
    /// Parse one line of terminal input: `r`, `m`, `lang <code>` or `q`.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if let Some((word, rest)) = line.split_once(char::is_whitespace) {
            let code = rest.trim();
            return (word == "lang" && !code.is_empty())
                .then(|| Command::SelectLocale(code.to_string()));
        }
        match line {
            "r" => Some(Command::Restart),
            "m" => Some(Command::ToggleMoreInfo),
            "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

enum Step {
    Event(DisplayEvent),
    Finished(RunOutcome),
    Command(Option<Command>),
}

/// Owns the page together with the two components that drive it.
pub struct App {
    translator: Translator,
    sequencer: Sequencer,
    page: Page,
    startup_delay: Duration,
}

impl App {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn PreferenceStore>,
        speed_test: SpeedTestConfig,
        startup_delay: Duration,
    ) -> Self {
        Self {
            translator: Translator::new(source, store),
            sequencer: Sequencer::new(speed_test),
            page: Page::standard(),
            startup_delay,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let source: Arc<dyn CatalogSource> = match &config.catalog_source {
            CatalogSourceKind::Embedded => Arc::new(EmbeddedCatalogSource::bundled()),
            CatalogSourceKind::Directory(dir) => Arc::new(DirectoryCatalogSource::new(dir)),
            CatalogSourceKind::Http(base_url) => {
                let client = reqwest::Client::builder()
                    .timeout(CATALOG_REQUEST_TIMEOUT)
                    .build()
                    .context("Failed to build HTTP client")?;
                Arc::new(HttpCatalogSource::new(client, base_url.as_str()))
            }
        };
        let store = Arc::new(FilePreferenceStore::new(&config.preferences_file));

        info!(
            "Catalogs from {:?}, preferences in {}",
            config.catalog_source,
            config.preferences_file.display()
        );

        Ok(Self::new(
            source,
            store,
            config.speed_test.clone(),
            config.startup_delay,
        ))
    }

    /// Localize the page, give it `startup_delay` to settle, then run the test.
    pub async fn start(&mut self, system_language: Option<&str>) -> RunOutcome {
        self.translator
            .initialize(system_language, &mut self.page)
            .await;
        tokio::time::sleep(self.startup_delay).await;
        self.sequencer.run(&mut self.page).await
    }

    pub async fn restart(&mut self) -> RunOutcome {
        self.sequencer
            .restart(&mut self.page, &self.translator)
            .await
    }

    pub fn toggle_more_info(&mut self) {
        self.page.toggle_more_info(&self.translator);
    }

    pub async fn select_locale(&mut self, code: &str) -> SelectOutcome {
        self.translator.select_locale(code, &mut self.page).await
    }

    /// Run the page interactively.
    ///
    /// The test runs while `commands` are handled, so toggling the panel or
    /// switching language takes effect mid-run. `render` is called whenever
    /// the page changes visibly: on every state change and download sample
    /// and after each command. A restart is ignored while a run is in flight.
    ///
    /// Returns when `Quit` arrives, or once `commands` is closed and the
    /// current run has finished. The outcome is that of the last finished run.
    pub async fn interact<F>(
        &mut self,
        system_language: Option<&str>,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        mut render: F,
    ) -> Option<RunOutcome>
    where
        F: FnMut(&Page),
    {
        let App {
            translator,
            sequencer,
            page,
            startup_delay,
        } = self;

        translator.initialize(system_language, page).await;
        render(page);

        let (tx, mut events) = mpsc::unbounded_channel();
        let mut commands_open = true;
        let mut last = None;
        let mut first = true;

        'session: loop {
            let delay = if first {
                *startup_delay
            } else {
                sequencer.prepare_restart(page, translator);
                render(page);
                Duration::ZERO
            };
            first = false;

            let mut sink = ChannelSink::new(tx.clone());
            let seq = &mut *sequencer;
            let run = async move {
                tokio::time::sleep(delay).await;
                seq.run(&mut sink).await
            };
            tokio::pin!(run);
            let mut running = true;

            loop {
                let step = tokio::select! {
                    biased;

                    Some(event) = events.recv() => Step::Event(event),
                    outcome = &mut run, if running => Step::Finished(outcome),
                    command = commands.recv(), if commands_open => Step::Command(command),
                };

                match step {
                    Step::Event(event) => {
                        let visible =
                            matches!(event, DisplayEvent::State(_) | DisplayEvent::Download(_));
                        event.apply_to(page);
                        if visible {
                            render(page);
                        }
                    }
                    Step::Finished(outcome) => {
                        running = false;
                        while let Ok(event) = events.try_recv() {
                            event.apply_to(page);
                        }
                        render(page);
                        last = Some(outcome);
                        if !commands_open {
                            break 'session;
                        }
                    }
                    Step::Command(None) => {
                        commands_open = false;
                        if !running {
                            break 'session;
                        }
                    }
                    Step::Command(Some(command)) => match command {
                        Command::ToggleMoreInfo => {
                            page.toggle_more_info(translator);
                            render(page);
                        }
                        Command::SelectLocale(code) => {
                            translator.select_locale(&code, page).await;
                            render(page);
                        }
                        Command::Restart if running => {
                            debug!("Ignoring restart, a test is already running");
                        }
                        Command::Restart => continue 'session,
                        Command::Quit => break 'session,
                    },
                }
            }
        }

        last
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }
}
