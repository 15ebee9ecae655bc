use std::time::Duration;

// Define some constants for the audio wire format. One frame is 20 ms of
// 48 kHz signed 16-bit interleaved stereo PCM.
pub const SAMPLE_RATE: u32 = 48000; // 48 kHz sample rate
pub const BIT_DEPTH: u16 = 16; // 16 bits per sample
pub const CHANNELS: u16 = 2; // Stereo channel

/// Samples per channel in one frame (20 ms at 48 kHz).
pub const FRAME_SAMPLES: usize = 960;

/// Bytes of raw PCM in one frame: 960 samples x 2 channels x 2 bytes.
pub const PCM_FRAME_BYTES: usize = FRAME_SAMPLES * CHANNELS as usize * (BIT_DEPTH as usize / 8);

/// Upper bound for one encoded wire frame.
pub const MAX_WIRE_FRAME_BYTES: usize = 3840;

/// Wall-clock length of one frame.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Grace period between the last transmitted frame and the "stopped
/// speaking" signal. The gateway clips the audio tail without it.
pub const SPEAKING_STOP_DELAY: Duration = Duration::from_millis(250);
