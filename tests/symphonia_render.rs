use std::path::Path;

use playout::backends::SymphoniaBackend;
use playout::backends::symphonia::{MIME_RAW, SymphoniaDemuxer};
use playout::demux::Demuxer;
use playout::format::MediaSource;
use playout::opts::Opts;
use playout::playback_loop::LoopExit;
use playout::track::select_audio_track;
use playout::{Error, Player};

fn write_fixture(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    frames: usize,
) -> anyhow::Result<Vec<i16>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    let mut samples = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        let phase = frame as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32;
        for ch in 0..channels {
            let sample = (phase.sin() * 8000.0) as i16 / (ch as i16 + 1);
            writer.write_sample(sample)?;
            samples.push(sample);
        }
    }
    writer.finalize()?;
    Ok(samples)
}

fn read_wav(path: &Path) -> anyhow::Result<(hound::WavSpec, Vec<i16>)> {
    let mut reader = hound::WavReader::open(path)?;
    let samples = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((reader.spec(), samples))
}

fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |mut crc, byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
        crc
    })
}

fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |mut crc, byte| {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Mono 16-bit 44.1 kHz FLAC whose frames store every 4096 sample block verbatim.
fn write_verbatim_flac(path: &Path, blocks: usize) -> anyhow::Result<Vec<i16>> {
    const BLOCK: usize = 4096;
    let frame_len = 6 + 1 + BLOCK * 2 + 2;
    let total = (blocks * BLOCK) as u64;

    let mut file = b"fLaC".to_vec();
    file.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
    file.extend_from_slice(&(BLOCK as u16).to_be_bytes());
    file.extend_from_slice(&(BLOCK as u16).to_be_bytes());
    file.extend_from_slice(&(frame_len as u32).to_be_bytes()[1..]);
    file.extend_from_slice(&(frame_len as u32).to_be_bytes()[1..]);
    file.extend_from_slice(&((44_100u64 << 44) | (15u64 << 36) | total).to_be_bytes());
    file.extend_from_slice(&[0u8; 16]);

    let mut samples = Vec::with_capacity(blocks * BLOCK);
    for block in 0..blocks {
        // Fixed block size, 4096 frames, 44.1 kHz, mono, 16 bit, frame number.
        let mut frame = vec![0xFF, 0xF8, 0xC9, 0x08, block as u8];
        frame.push(crc8(&frame));
        // Verbatim subframe, no wasted bits.
        frame.push(0x02);
        for i in 0..BLOCK {
            let n = block * BLOCK + i;
            let sample = (((n % 120) as i16) << 8) | ((n * 7 % 250) as i16);
            frame.extend_from_slice(&sample.to_be_bytes());
            samples.push(sample);
        }
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        assert_eq!(frame.len(), frame_len);
        file.extend_from_slice(&frame);
    }

    std::fs::write(path, file)?;
    Ok(samples)
}

#[test]
fn verbatim_flac_frames_fit_the_input_slots() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("verbatim.flac");
    let output = dir.path().join("rendered.wav");
    let expected = write_verbatim_flac(&input, 2)?;

    let mut demuxer = SymphoniaDemuxer::open(&MediaSource::from(input.as_path()), None)?;
    let track = select_audio_track(&mut demuxer)?;
    assert_eq!(track.mime, "audio/flac");
    assert!(track.max_input_chunk_bytes >= 4096 * 2 + 9);
    demuxer.release()?;

    let mut player = Player::new(SymphoniaBackend::new(&output), Opts::default());
    player.play(input.as_path())?;
    let report = player.wait()?;

    assert_eq!(report.exit, LoopExit::EndOfStream);
    assert_eq!(report.stats.bytes_written, expected.len() as u64 * 2);
    let (spec, rendered) = read_wav(&output)?;
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(rendered, expected);
    Ok(())
}

#[test]
fn demuxer_describes_a_pcm_wav() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("tone.wav");
    write_fixture(&input, 8_000, 1, 2_400)?;

    let mut demuxer = SymphoniaDemuxer::open(&MediaSource::from(input.as_path()), Some("wav"))?;
    let track = select_audio_track(&mut demuxer)?;

    assert_eq!(track.mime, MIME_RAW);
    assert_eq!(track.sample_rate_hz, 8_000);
    assert_eq!(track.channel_count, 1);
    assert_eq!(track.format.duration_us, Some(300_000));
    assert_eq!(demuxer.sample_time_us(), Some(0));

    let mut buf = vec![0u8; track.max_input_chunk_bytes];
    let mut total = 0;
    while let Some(size) = demuxer.read_sample_data(&mut buf)? {
        total += size;
        if !demuxer.advance()? {
            break;
        }
    }
    assert_eq!(total, 2_400 * 2);
    demuxer.release()?;
    Ok(())
}

#[test]
fn renders_mono_wav_in_real_time() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("tone.wav");
    let output = dir.path().join("rendered.wav");
    let expected = write_fixture(&input, 8_000, 1, 2_400)?;

    let started = std::time::Instant::now();
    let mut player = Player::new(SymphoniaBackend::new(&output), Opts::default());
    player.play(input.to_string_lossy().into_owned())?;
    let report = player.wait()?;

    assert_eq!(report.exit, LoopExit::EndOfStream);
    assert!(report.teardown.is_clean());
    assert_eq!(report.stats.format_changes, 0);
    assert_eq!(report.stats.bytes_written, 2_400 * 2);
    // Playback is paced: most of the 300ms clip has to elapse.
    assert!(started.elapsed() >= std::time::Duration::from_millis(150));

    let (spec, rendered) = read_wav(&output)?;
    assert_eq!(spec.sample_rate, 8_000);
    assert_eq!(spec.channels, 1);
    assert_eq!(rendered, expected);
    Ok(())
}

#[test]
fn renders_stereo_wav() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("stereo.wav");
    let output = dir.path().join("rendered.wav");
    let expected = write_fixture(&input, 44_100, 2, 4_410)?;

    let mut player = Player::new(SymphoniaBackend::new(&output), Opts::default());
    player.play(input.as_path())?;
    player.wait()?;

    let (spec, rendered) = read_wav(&output)?;
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.channels, 2);
    assert_eq!(rendered, expected);
    Ok(())
}

#[test]
fn garbage_input_is_unavailable() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("noise.bin");
    std::fs::write(&input, vec![0x5au8; 4096])?;

    let mut player = Player::new(
        SymphoniaBackend::new(dir.path().join("out.wav")),
        Opts::default(),
    );
    assert!(matches!(
        player.play(input.as_path()),
        Err(Error::SourceUnavailable { .. })
    ));
    assert!(!dir.path().join("out.wav").exists());
    Ok(())
}
