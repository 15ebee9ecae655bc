use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use crier::bot::{Bot, ChatVoice};
use crier::cache::SourceCache;
use crier::chat::UserId;
use crier::config;
use crier::console::ConsoleClient;
use crier::engine::AudioEngine;
use crier::monitor::MonitorTransport;
use crier::preview::hn::HackerNewsPreviewer;
use crier::preview::Previewer;
use crier::resolver::{MediaResolver, ResolveTrack};
use crier::speech::{HttpSpeechProvider, SpeechCache, SpeechProvider};
use crier::transcode::FfmpegTranscoder;

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init_timed();

    let config = config::load().await?;

    let transcoder = Arc::new(FfmpegTranscoder::new(
        config
            .audio
            .ffmpeg
            .clone()
            .unwrap_or_else(|| "ffmpeg".to_string()),
    ));

    let cache = Arc::new(
        SourceCache::new(config.audio.data_dir.join("tracks"), transcoder.clone()).await?,
    );

    let speech = match &config.speech {
        Some(speech_config) => {
            let provider: Arc<dyn SpeechProvider> = Arc::new(HttpSpeechProvider::new(
                &speech_config.speech_url,
                speech_config.voice.clone(),
            ));

            Some(Arc::new(
                SpeechCache::new(config.audio.data_dir.join("speech"), provider).await?,
            ))
        }
        None => {
            info!("no speech endpoint configured, announcements are off");
            None
        }
    };

    let resolver: Arc<dyn ResolveTrack> = Arc::new(MediaResolver::init().await?);

    let previewers: Vec<Arc<dyn Previewer>> = vec![Arc::new(HackerNewsPreviewer::new(
        config.preview.hn_item_re.clone(),
        config.preview.hn_api_url.clone(),
    ))];

    let monitor = MonitorTransport::start(&config.monitor.listen_addr).await?;

    let owner = UserId::from(config.chat.owner.as_str());
    let (client, events) = ConsoleClient::new(owner.clone(), monitor);

    let voice = ChatVoice::new(client.clone(), None);

    let engine = AudioEngine::new();
    engine.start(voice.clone());

    let bot = Bot::new(
        client.clone(),
        engine,
        voice,
        cache,
        transcoder,
        resolver,
        speech,
        previewers,
        owner,
    );

    client.start();
    info!("bot is now running");

    tokio::select! {
        _ = bot.run(events) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("could not listen for shutdown")?;
            info!("interrupted, shutting down");
        }
    }

    Ok(())
}
