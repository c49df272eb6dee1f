//! # pmomedia - Chaîne d'outils média de PMOArchive
//!
//! Tout ce qui touche au contenu des fichiers audio passe par ici : le
//! sondage ffprobe, le décodage et le repli de la forme d'onde, le rendu
//! PNG de la vignette et le transcodage MP3 en flux. Les outils externes
//! sont des sous-processus dont la durée de vie est bornée à l'appel.
//!
//! Le [`AudioMetadataProvider`] relie cette chaîne au worker de fond de
//! `pmoarchive`.

pub mod error;
pub mod preview;
pub mod probe;
pub mod provider;
pub mod transcode;
pub mod waveform;

pub use error::MediaError;
pub use preview::{parse_color, render_png, PreviewOptions};
pub use probe::{probe_audio, AudioInfo, ProbeReport};
pub use provider::AudioMetadataProvider;
pub use transcode::{mp3_command, transcode_to_mp3, RawAudioFormat};
