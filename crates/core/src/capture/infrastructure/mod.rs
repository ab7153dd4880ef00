pub mod ffmpeg_frame_source;
pub mod latest_frame_slot;
