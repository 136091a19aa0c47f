use std::{
    io::{self, Write},
    path::Path,
    str::FromStr,
};

use env_logger::Builder;
use log::LevelFilter;
use tokio::{
    fs::{create_dir_all, metadata, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::config;

pub struct AsyncWriter {
    sender: UnboundedSender<Vec<u8>>,
}

impl Write for AsyncWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .send(buf.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Logger {
    sender: UnboundedSender<Vec<u8>>,
    receiver: UnboundedReceiver<Vec<u8>>,
    config: config::Log,
}

impl Logger {
    pub fn new(config: config::Log) -> Self {
        let (sender, receiver) = unbounded_channel::<Vec<u8>>();
        Self {
            sender,
            receiver,
            config,
        }
    }

    fn create_async_writer(&self) -> AsyncWriter {
        AsyncWriter {
            sender: self.sender.clone(),
        }
    }

    fn level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.config.level).unwrap_or(LevelFilter::Info)
    }

    /// Installs the global logger. `RUST_LOG` overrides the configured level.
    pub fn init_env_logger(&self) {
        let mut builder = Builder::new();
        builder.filter(None, self.level());
        builder.parse_env(env_logger::Env::default());
        if self.config.path.is_some() {
            builder.target(env_logger::Target::Pipe(Box::new(self.create_async_writer())));
        }
        builder.init();
    }

    /// Drains buffered log lines into the configured file until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) -> io::Result<()> {
        let Some(log_file_path) = self.config.path.clone() else {
            return Ok(());
        };

        if let Some(parent) = Path::new(&log_file_path).parent() {
            if !parent.as_os_str().is_empty() && metadata(parent).await.is_err() {
                create_dir_all(parent).await?;
            }
        }

        let mut file = BufWriter::new(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(&log_file_path)
                .await?,
        );
        // the logger owns the only other sender
        drop(self.sender);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                data = self.receiver.recv() => {
                    match data {
                        Some(data) => {
                            file.write_all(&data).await?;
                            file.flush().await?;
                        }
                        None => break,
                    }
                }
            }
        }

        while let Ok(data) = self.receiver.try_recv() {
            file.write_all(&data).await?;
        }
        file.flush().await
    }
}

/// Installs the global logger and, when `log.path` is set, spawns the file sink.
pub fn init_logger(config: &config::Log, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
    let logger = Logger::new(config.clone());
    logger.init_env_logger();

    if config.path.is_none() {
        return None;
    }
    Some(tokio::spawn(async move {
        if let Err(e) = logger.run(shutdown).await {
            eprintln!("Failed to write log file: {e}");
        }
    }))
}
