//! WAV export of rendered PCM.

use std::path::Path;

use crate::render::PreparedAudio;
use crate::Result;

/// Write prepared audio to a 16-bit stereo WAV file.
///
/// The mono render is duplicated to both channels, matching playback. The
/// container sample rate is the chip rate rounded to integer Hz (WAV has
/// no fractional rates); duration math elsewhere keeps the exact rate.
pub fn export_to_wav<P: AsRef<Path>>(audio: &PreparedAudio, output_path: P) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: audio.sample_rate.round() as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(output_path.as_ref(), spec)
        .map_err(|e| format!("Failed to create WAV file: {e}"))?;

    for &sample in audio.samples.iter() {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        for _ in 0..2 {
            writer
                .write_sample(sample_i16)
                .map_err(|e| format!("Failed to write sample: {e}"))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| format!("Failed to finalize WAV file: {e}"))?;

    Ok(())
}
