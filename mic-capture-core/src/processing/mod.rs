pub mod gain;
pub mod level_meter;
pub mod pcm;
pub mod wav_format;
