//! Écriture zip en flux
//!
//! L'export zip est produit pendant qu'il se télécharge : aucune archive
//! temporaire sur disque et une mémoire bornée à un tampon de compression.
//! Le conteneur est écrit à la main pour rester séquentiel : les tailles et
//! le CRC d'une entrée ne sont connus qu'après compression, ils partent
//! donc dans un data descriptor (bit 3 du drapeau général) et le répertoire
//! central reprend les valeurs exactes à la fin.
//!
//! Pas de zip64 : un export qui dépasse 4 GiB est refusé.

use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

const LOCAL_HEADER_SIG: u32 = 0x04034b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x08074b50;
const CENTRAL_HEADER_SIG: u32 = 0x02014b50;
const EOCD_SIG: u32 = 0x06054b50;

/// Bit 3 : tailles dans le data descriptor. Bit 11 : noms UTF-8.
const GP_FLAGS: u16 = (1 << 3) | (1 << 11);
const METHOD_DEFLATE: u16 = 8;
const VERSION_NEEDED: u16 = 20;

const READ_CHUNK: usize = 64 * 1024;

struct CentralRecord {
    name: String,
    dos_time: u16,
    dos_date: u16,
    crc: u32,
    compressed: u32,
    uncompressed: u32,
    offset: u32,
}

/// Écrit une archive zip entrée par entrée dans un canal d'octets.
pub struct ZipStreamWriter {
    tx: mpsc::Sender<Bytes>,
    offset: u64,
    entries: Vec<CentralRecord>,
}

impl ZipStreamWriter {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        ZipStreamWriter {
            tx,
            offset: 0,
            entries: Vec::new(),
        }
    }

    /// Compresse et émet une entrée complète depuis un lecteur.
    pub async fn add_entry(
        &mut self,
        name: &str,
        modified: DateTime<Utc>,
        mut reader: impl AsyncRead + Unpin,
    ) -> std::io::Result<()> {
        let entry_offset = as_u32(self.offset)?;
        let (dos_time, dos_date) = dos_datetime(modified);

        let mut header = Vec::with_capacity(30 + name.len());
        put_u32(&mut header, LOCAL_HEADER_SIG);
        put_u16(&mut header, VERSION_NEEDED);
        put_u16(&mut header, GP_FLAGS);
        put_u16(&mut header, METHOD_DEFLATE);
        put_u16(&mut header, dos_time);
        put_u16(&mut header, dos_date);
        put_u32(&mut header, 0); // crc, dans le descriptor
        put_u32(&mut header, 0); // taille compressée, idem
        put_u32(&mut header, 0); // taille décompressée, idem
        put_u16(&mut header, name.len() as u16);
        put_u16(&mut header, 0); // extra
        header.extend_from_slice(name.as_bytes());
        self.send(header).await?;

        let mut crc = crc32fast::Hasher::new();
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        let mut uncompressed: u64 = 0;
        let mut compressed: u64 = 0;
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            uncompressed += n as u64;
            crc.update(&chunk[..n]);
            encoder.write_all(&chunk[..n])?;
            // Vider le tampon de l'encodeur au fil de l'eau : la mémoire
            // reste bornée quelle que soit la taille du fichier.
            let ready = std::mem::take(encoder.get_mut());
            if !ready.is_empty() {
                compressed += ready.len() as u64;
                self.send(ready).await?;
            }
        }
        let tail = encoder.finish()?;
        compressed += tail.len() as u64;
        self.send(tail).await?;

        let crc = crc.finalize();
        let compressed = as_u32(compressed)?;
        let uncompressed = as_u32(uncompressed)?;

        let mut descriptor = Vec::with_capacity(16);
        put_u32(&mut descriptor, DATA_DESCRIPTOR_SIG);
        put_u32(&mut descriptor, crc);
        put_u32(&mut descriptor, compressed);
        put_u32(&mut descriptor, uncompressed);
        self.send(descriptor).await?;

        self.offset += 30 + name.len() as u64 + compressed as u64 + 16;
        as_u32(self.offset)?;
        self.entries.push(CentralRecord {
            name: name.to_string(),
            dos_time,
            dos_date,
            crc,
            compressed,
            uncompressed,
            offset: entry_offset,
        });
        Ok(())
    }

    /// Émet le répertoire central et la fin d'archive.
    pub async fn finish(mut self) -> std::io::Result<()> {
        let central_offset = as_u32(self.offset)?;
        let mut central = Vec::new();
        for entry in &self.entries {
            put_u32(&mut central, CENTRAL_HEADER_SIG);
            put_u16(&mut central, VERSION_NEEDED); // version créatrice
            put_u16(&mut central, VERSION_NEEDED);
            put_u16(&mut central, GP_FLAGS);
            put_u16(&mut central, METHOD_DEFLATE);
            put_u16(&mut central, entry.dos_time);
            put_u16(&mut central, entry.dos_date);
            put_u32(&mut central, entry.crc);
            put_u32(&mut central, entry.compressed);
            put_u32(&mut central, entry.uncompressed);
            put_u16(&mut central, entry.name.len() as u16);
            put_u16(&mut central, 0); // extra
            put_u16(&mut central, 0); // commentaire
            put_u16(&mut central, 0); // disque
            put_u16(&mut central, 0); // attributs internes
            put_u32(&mut central, 0); // attributs externes
            put_u32(&mut central, entry.offset);
            central.extend_from_slice(entry.name.as_bytes());
        }
        let central_size = as_u32(central.len() as u64)?;
        self.send(central).await?;

        let count = u16::try_from(self.entries.len())
            .map_err(|_| std::io::Error::other("too many zip entries"))?;
        let mut eocd = Vec::with_capacity(22);
        put_u32(&mut eocd, EOCD_SIG);
        put_u16(&mut eocd, 0); // disque
        put_u16(&mut eocd, 0); // disque du répertoire central
        put_u16(&mut eocd, count);
        put_u16(&mut eocd, count);
        put_u32(&mut eocd, central_size);
        put_u32(&mut eocd, central_offset);
        put_u16(&mut eocd, 0); // commentaire
        self.send(eocd).await?;
        Ok(())
    }

    async fn send(&mut self, bytes: Vec<u8>) -> std::io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Bytes::from(bytes))
            .await
            // Récepteur parti : le client a coupé le téléchargement.
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }
}

fn put_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

fn as_u32(value: u64) -> std::io::Result<u32> {
    u32::try_from(value).map_err(|_| std::io::Error::other("zip export exceeds 4 GiB"))
}

/// Horodatage MS-DOS, résolution de deux secondes, plancher en 1980.
fn dos_datetime(when: DateTime<Utc>) -> (u16, u16) {
    let year = when.year().clamp(1980, 2107);
    let date = (((year - 1980) as u16) << 9) | ((when.month() as u16) << 5) | when.day() as u16;
    let time =
        ((when.hour() as u16) << 11) | ((when.minute() as u16) << 5) | (when.second() as u16 / 2);
    (time, date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    async fn collect(rx: &mut mpsc::Receiver<Bytes>) -> Vec<u8> {
        let mut all = Vec::new();
        while let Some(chunk) = rx.recv().await {
            all.extend_from_slice(&chunk);
        }
        all
    }

    fn when() -> DateTime<Utc> {
        "2021-06-15T10:30:42Z".parse().unwrap()
    }

    #[tokio::test]
    async fn test_archive_readable_by_zip_crate() {
        let (tx, mut rx) = mpsc::channel(16);
        let writer_task = tokio::spawn(async move {
            let mut writer = ZipStreamWriter::new(tx);
            writer
                .add_entry("shows/a.mp3", when(), &b"first payload"[..])
                .await
                .unwrap();
            writer
                .add_entry("INFO.txt", when(), &b"manifest"[..])
                .await
                .unwrap();
            writer.finish().await.unwrap();
        });
        let bytes = collect(&mut rx).await;
        writer_task.await.unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("shows/a.mp3")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first payload");
        content.clear();
        archive
            .by_name("INFO.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "manifest");
    }

    #[tokio::test]
    async fn test_large_entry_streams_in_chunks() {
        let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 253) as u8).collect();
        let expected = payload.clone();
        let (tx, mut rx) = mpsc::channel(16);
        let writer_task = tokio::spawn(async move {
            let mut writer = ZipStreamWriter::new(tx);
            writer
                .add_entry("big.bin", when(), payload.as_slice())
                .await
                .unwrap();
            writer.finish().await.unwrap();
        });
        let bytes = collect(&mut rx).await;
        writer_task.await.unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = Vec::new();
        archive
            .by_name("big.bin")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, expected);
    }

    #[tokio::test]
    async fn test_empty_archive_still_valid() {
        let (tx, mut rx) = mpsc::channel(4);
        let writer_task = tokio::spawn(async move {
            ZipStreamWriter::new(tx).finish().await.unwrap();
        });
        let bytes = collect(&mut rx).await;
        writer_task.await.unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_surfaces_broken_pipe() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = ZipStreamWriter::new(tx);
        let err = writer
            .add_entry("a.bin", when(), &b"data"[..])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_dos_datetime_packing() {
        let (time, date) = dos_datetime(when());
        assert_eq!(date >> 9, 2021 - 1980);
        assert_eq!((date >> 5) & 0xf, 6);
        assert_eq!(date & 0x1f, 15);
        assert_eq!(time >> 11, 10);
        assert_eq!((time >> 5) & 0x3f, 30);
        assert_eq!(time & 0x1f, 21);
    }
}
