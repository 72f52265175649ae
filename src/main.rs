#[cfg(not(all(feature = "streaming", feature = "testtone")))]
fn main() {
    eprintln!(
        "The ym2151-player CLI requires the \"streaming\" and \"testtone\" features. Rebuild with `--features streaming,testtone` to enable playback."
    );
}

#[cfg(all(feature = "streaming", feature = "testtone"))]
fn main() -> anyhow::Result<()> {
    cli::run()
}

#[cfg(all(feature = "streaming", feature = "testtone"))]
mod cli {
    use std::env;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{bail, Context};

    use ym2151_player::module::{ModuleLoader, TestToneSource};
    use ym2151_player::{decode, PlaybackController, PlaybackState, RodioSink};

    #[cfg(feature = "visualization")]
    const TRACE_WIDTH: u32 = 72;
    #[cfg(feature = "visualization")]
    const TRACE_HEIGHT: u32 = 16;

    struct Args {
        log_path: String,
        wav_path: Option<String>,
        seconds: Option<f64>,
    }

    fn usage() -> ! {
        eprintln!("Usage: ym2151-player <log.json> [--wav <out.wav>] [--seconds <n>]");
        eprintln!();
        eprintln!("Plays a YM2151 register-write log through the built-in test module.");
        eprintln!("  --wav <out.wav>   also export the rendered PCM (export-wav feature)");
        eprintln!("  --seconds <n>     stop after n seconds instead of one loop");
        std::process::exit(2);
    }

    fn parse_args() -> Args {
        let mut args = env::args().skip(1);
        let mut log_path = None;
        let mut wav_path = None;
        let mut seconds = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--wav" => wav_path = args.next(),
                "--seconds" => seconds = args.next().and_then(|s| s.parse().ok()),
                "-h" | "--help" => usage(),
                _ if log_path.is_none() => log_path = Some(arg),
                _ => usage(),
            }
        }

        match log_path {
            Some(log_path) => Args {
                log_path,
                wav_path,
                seconds,
            },
            None => usage(),
        }
    }

    pub fn run() -> anyhow::Result<()> {
        let args = parse_args();

        let raw = fs::read_to_string(&args.log_path)
            .with_context(|| format!("reading {}", args.log_path))?;
        let sequence = decode(&raw);
        if sequence.is_empty() {
            bail!("no events decoded from {}", args.log_path);
        }
        println!(
            "{}: {} events, last at {:.3}s",
            args.log_path,
            sequence.len(),
            sequence.max_time()
        );

        let loader = Arc::new(ModuleLoader::new(Arc::new(TestToneSource::new())));
        loader
            .ensure_loaded()
            .context("loading the chip module")?;

        let sink = RodioSink::new().context("opening the audio output")?;
        let mut controller = PlaybackController::new(loader, Box::new(sink));
        controller.set_sequence(Some(sequence));

        let state = controller.play().context("starting playback")?;
        debug_assert_eq!(state, PlaybackState::Playing);

        let audio = controller
            .prepared()
            .cloned()
            .context("render produced no audio")?;
        println!(
            "rendered {} frames ({:.2}s at {:.1} Hz)",
            audio.len(),
            audio.duration_seconds(),
            audio.sample_rate
        );

        #[cfg(feature = "visualization")]
        {
            let trace =
                ym2151_player::WaveformTrace::render(&audio.samples, TRACE_WIDTH, TRACE_HEIGHT);
            println!("{}", trace.to_ascii());
        }

        if let Some(wav_path) = &args.wav_path {
            export(&audio, wav_path)?;
        }

        let play_for = args
            .seconds
            .unwrap_or_else(|| audio.duration_seconds().max(0.1));
        std::thread::sleep(Duration::from_secs_f64(play_for));
        controller.stop();

        Ok(())
    }

    #[cfg(feature = "export-wav")]
    fn export(audio: &ym2151_player::PreparedAudio, path: &str) -> anyhow::Result<()> {
        ym2151_player::export_to_wav(audio, path)
            .with_context(|| format!("exporting {path}"))?;
        println!("wrote {path}");
        Ok(())
    }

    #[cfg(not(feature = "export-wav"))]
    fn export(_audio: &ym2151_player::PreparedAudio, _path: &str) -> anyhow::Result<()> {
        bail!("--wav requires the \"export-wav\" feature")
    }
}
