//! The vtuber driver: wires live-chat and HTTP ingress through the
//! chat-response pipeline into speech, playback, and the avatar renderer.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rand::Rng;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vtuber_audio::AudioController;
use vtuber_chatbot::{
    text_out_from_chatbot, Chatbot, CooldownChatbot, NoSessionConfig, PrioritizedChatbot,
    SessionClientsPool, SessionConfig,
};
use vtuber_config::{ConfigError, Settings};
use vtuber_core::{ellipsis, Cooldown, Priority, TextIn, TextOut};
use vtuber_live2d::{AvatarDriver, Live2dDriver};
use vtuber_pipeline::{PriorityReduceFilter, TooLongFilter, CHANNEL_BUFFER};
use vtuber_sayer::LipsyncSayer;
use vtuber_speech::SayerClientPool;

use vtuber_server::dm::text_in_from_dm;
use vtuber_server::{http_in, sink};

#[derive(Parser)]
#[command(name = "vtuber-driver", about = "Coordination core of a live AI vtuber")]
struct Args {
    /// Path to the YAML config file
    #[arg(short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print an example config to stdout and exit
    #[arg(long = "gen_example_config")]
    gen_example_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.gen_example_config {
        match Settings::example().to_yaml_string() {
            Ok(yaml) => print!("{yaml}"),
            Err(e) => {
                eprintln!("failed to render example config: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    init_tracing();

    let Some(path) = args.config else {
        tracing::error!("{}", ConfigError::Missing);
        std::process::exit(1);
    };
    let settings = match Settings::from_yaml_file(&path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "cannot load config");
            std::process::exit(1);
        }
    };

    tracing::info!(config = ?settings.desensitized(), "configuration loaded");

    if let Err(e) = run(settings).await {
        tracing::error!(error = %e, "driver failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let (text_in_tx, text_in_rx) = mpsc::channel::<TextIn>(CHANNEL_BUFFER);
    let (text_out_tx, text_out_rx) = mpsc::channel::<TextOut>(CHANNEL_BUFFER);

    // audio controller: websocket endpoint for the audio-view
    let audio_controller = AudioController::new();
    if !settings.listen.audio_controller_ws.is_empty() {
        let listener =
            tokio::net::TcpListener::bind(&settings.listen.audio_controller_ws).await?;
        tracing::info!(addr = %settings.listen.audio_controller_ws, "audio controller listening");
        let app = vtuber_audio::ws::router(audio_controller.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "audio controller server exited");
            }
        });
    }

    // avatar renderer + sayer
    let live2d: Arc<dyn AvatarDriver> = Arc::new(Live2dDriver::new(
        settings.live2d.driver.clone(),
        settings.live2d.forwarder.clone(),
    ));
    let tts = Arc::new(SayerClientPool::new(
        &settings.sayer.server,
        vtuber_speech::DEFAULT_POOL_SIZE,
    )?);
    let sayer = Arc::new(LipsyncSayer::new(
        tts,
        audio_controller.clone(),
        live2d.clone(),
        settings.sayer.lipsync,
        settings.sayer.role.clone(),
    ));

    // ingress: live chat + http
    if settings.blivedm.roomid != 0 && !settings.blivedm.server.is_empty() {
        tokio::spawn(text_in_from_dm(
            settings.blivedm.roomid,
            settings.blivedm.server.clone(),
            text_in_tx.clone(),
        ));
    }
    if !settings.listen.text_in_http.is_empty() {
        let listener = tokio::net::TcpListener::bind(&settings.listen.text_in_http).await?;
        tracing::info!(addr = %settings.listen.text_in_http, "text-in http listening");
        let app = http_in::router(text_in_tx.clone(), "/");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "text-in http server exited");
            }
        });
    }

    // in -> reduce -> (echo) -> chatbot -> out
    let mut text_in_stream =
        PriorityReduceFilter::new(settings.reduce_duration()).spawn(text_in_rx);
    if settings.read_dm {
        text_in_stream = spawn_echo_stage(text_in_stream, sayer.clone());
    }

    let chatbot = build_chatbot(&settings)?;
    tokio::spawn(text_out_from_chatbot(chatbot, text_in_stream, text_out_tx));

    // out -> too-long gate -> reduce -> say & forward
    let (quibble_tx, mut quibble_rx) = mpsc::channel::<String>(8);
    let too_long = TooLongFilter::new(
        settings.too_long.max_words,
        settings.too_long.quibbles.clone(),
    );
    let text_out_stream = too_long.spawn(
        text_out_rx,
        Box::new(move |_text, quibble| {
            if let Some(quibble) = quibble {
                let _ = quibble_tx.try_send(quibble.to_string());
            }
        }),
    );
    {
        // dismiss over-long answers aloud, off the pipeline's back
        let sayer = sayer.clone();
        tokio::spawn(async move {
            while let Some(quibble) = quibble_rx.recv().await {
                if let Err(e) = sayer.say(&quibble).await {
                    tracing::warn!(error = %e, "saying quibble failed");
                }
            }
        });
    }
    let mut text_out_stream =
        PriorityReduceFilter::new(settings.reduce_duration()).spawn(text_out_stream);

    // drain: renderer nudge, speech, optional http forward
    let http_sink = reqwest::Client::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let text_out = tokio::select! {
            _ = &mut shutdown => break,
            received = text_out_stream.recv() => match received {
                Some(text_out) => text_out,
                None => break,
            },
        };

        tracing::info!(
            author = %text_out.author,
            content = %ellipsis::centering(&text_out.content, 17),
            "text out"
        );

        if let Err(e) = live2d.text_out(&text_out).await {
            tracing::warn!(error = %e, "live2d driver nudge failed");
        }

        if let Err(e) = sayer.say(&text_out.content).await {
            tracing::warn!(error = %e, "say failed");
        }

        if !settings.text_out_http.server.is_empty() {
            if rand::thread_rng().gen_range(0..100) >= settings.text_out_http.drop_rate {
                sink::text_out_to_http(&http_sink, &settings.text_out_http.server, &text_out)
                    .await;
            } else {
                tracing::debug!("randomly dropped text out forward");
            }
        }
    }

    tracing::info!("driver shut down");
    Ok(())
}

/// Echo stage: read each comment aloud before the chatbot answers it.
fn spawn_echo_stage(
    mut rx: mpsc::Receiver<TextIn>,
    sayer: Arc<LipsyncSayer>,
) -> mpsc::Receiver<TextIn> {
    let (tx, out) = mpsc::channel(CHANNEL_BUFFER);
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sayer.say(&text.content).await {
                tracing::warn!(error = %e, "reading comment aloud failed");
            }
            if tx.send(text).await.is_err() {
                return;
            }
        }
    });
    out
}

fn build_chatbot(settings: &Settings) -> Result<PrioritizedChatbot, Box<dyn std::error::Error>> {
    let mut chatbots: BTreeMap<Priority, Arc<dyn Chatbot>> = BTreeMap::new();

    let musharing = &settings.chatbot.musharing;
    let (enabled, valid) = musharing.is_enabled_and_valid();
    if enabled {
        valid?;
        let pool = SessionClientsPool::new(
            &musharing.server,
            vec![Arc::new(NoSessionConfig) as Arc<dyn SessionConfig>],
        )?
        .with_name("MusharingChatbot");
        chatbots.insert(Priority::LOW, Arc::new(pool));
    }

    let chatgpt = &settings.chatbot.chatgpt;
    let (enabled, valid) = chatgpt.is_enabled_and_valid();
    if enabled {
        valid?;
        let configs: Vec<Arc<dyn SessionConfig>> = chatgpt
            .configs
            .iter()
            .map(|c| Arc::new(c.clone()) as Arc<dyn SessionConfig>)
            .collect();
        let pool = SessionClientsPool::new(&chatgpt.server, configs)?.with_name("ChatGPTChatbot");

        let cooldown = if chatgpt.cooldown > 0 {
            Cooldown::new(chatgpt.cooldown_duration())
        } else {
            Cooldown::from_env()
        };
        chatbots.insert(
            Priority::HIGH,
            Arc::new(CooldownChatbot::new(pool, cooldown)),
        );
    }

    Ok(PrioritizedChatbot::new(chatbots))
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
