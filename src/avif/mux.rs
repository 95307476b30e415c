//! ISO-BMFF assembly for AVIF stills (`avif` brand) and image
//! sequences (`avis` brand).

use byteorder::{BigEndian, WriteBytesExt};

use super::boxes::Nclx;

const ALPHA_AUX_TYPE: &[u8] = b"urn:mpeg:mpegB:cicp:systems:auxiliary:alpha\0";

/// Growable box writer; a [`BoxScope`] patches the 4-byte size field of
/// its box when closed.
pub(crate) struct BoxWriter {
    data: Vec<u8>,
}

pub(crate) struct BoxScope {
    size_pos: usize,
}

impl BoxWriter {
    pub(crate) fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub(crate) fn open(&mut self, typ: &[u8; 4]) -> BoxScope {
        let size_pos = self.data.len();
        self.data.write_u32::<BigEndian>(0).expect("vec write");
        self.data.extend_from_slice(typ);
        BoxScope { size_pos }
    }

    /// Open a full box (version + 24-bit flags).
    pub(crate) fn open_full(&mut self, typ: &[u8; 4], version: u8, flags: u32) -> BoxScope {
        let scope = self.open(typ);
        self.data
            .write_u32::<BigEndian>(u32::from(version) << 24 | (flags & 0x00FF_FFFF))
            .expect("vec write");
        scope
    }

    pub(crate) fn close(&mut self, scope: BoxScope) {
        let size = (self.data.len() - scope.size_pos) as u32;
        self.data[scope.size_pos..scope.size_pos + 4].copy_from_slice(&size.to_be_bytes());
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub(crate) fn u16(&mut self, v: u16) {
        self.data.write_u16::<BigEndian>(v).expect("vec write");
    }

    pub(crate) fn u32(&mut self, v: u32) {
        self.data.write_u32::<BigEndian>(v).expect("vec write");
    }

    pub(crate) fn bytes(&mut self, v: &[u8]) {
        self.data.extend_from_slice(v);
    }

    /// Reserve a `u32` to be patched later.
    pub(crate) fn mark_u32(&mut self) -> usize {
        let pos = self.data.len();
        self.u32(0);
        pos
    }

    pub(crate) fn patch_u32(&mut self, pos: usize, v: u32) {
        self.data[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    pub(crate) fn position(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Everything needed to place one image (or frame) into a container.
pub(crate) struct ItemPayload<'a> {
    pub obus: &'a [u8],
    pub av1c: &'a [u8],
}

pub(crate) struct ColorDescription<'a> {
    pub icc: Option<&'a [u8]>,
    pub nclx: Option<Nclx>,
}

impl ColorDescription<'_> {
    fn is_present(&self) -> bool {
        self.icc.is_some() || self.nclx.is_some()
    }
}

fn write_colr(w: &mut BoxWriter, color: &ColorDescription<'_>) {
    if let Some(icc) = color.icc {
        let b = w.open(b"colr");
        w.bytes(b"prof");
        w.bytes(icc);
        w.close(b);
    } else if let Some(nclx) = color.nclx {
        let b = w.open(b"colr");
        w.bytes(b"nclx");
        w.u16(nclx.color_primaries);
        w.u16(nclx.transfer_characteristics);
        w.u16(nclx.matrix_coefficients);
        w.u8(if nclx.full_range { 0x80 } else { 0 });
        w.close(b);
    }
}

fn write_av1c(w: &mut BoxWriter, av1c: &[u8]) {
    let b = w.open(b"av1C");
    w.bytes(av1c);
    w.close(b);
}

/// Assemble a still `avif` file: primary item, optional alpha item,
/// optional ICC and XMP.
pub(crate) fn pack_still(
    width: u32,
    height: u32,
    bit_depth: u8,
    primary: ItemPayload<'_>,
    alpha: Option<ItemPayload<'_>>,
    color: &ColorDescription<'_>,
    xmp: Option<&[u8]>,
) -> Vec<u8> {
    let mut w = BoxWriter::new();

    let b = w.open(b"ftyp");
    w.bytes(b"avif");
    w.u32(0);
    w.bytes(b"avifmif1miafMA1B");
    w.close(b);

    let has_alpha = alpha.is_some();
    let has_xmp = xmp.is_some();
    let alpha_id = 2u16;
    let xmp_id = if has_alpha { 3u16 } else { 2u16 };
    let item_count = 1 + u16::from(has_alpha) + u16::from(has_xmp);

    // iloc offset fields, patched once mdat positions are known.
    let mut extent_markers: Vec<usize> = Vec::new();

    let meta = w.open_full(b"meta", 0, 0);
    {
        let b = w.open_full(b"hdlr", 0, 0);
        w.u32(0);
        w.bytes(b"pict");
        w.u32(0);
        w.u32(0);
        w.u32(0);
        w.bytes(b"framecodec\0");
        w.close(b);

        let b = w.open_full(b"pitm", 0, 0);
        w.u16(1);
        w.close(b);

        let b = w.open_full(b"iloc", 0, 0);
        w.u8(0x44); // 4-byte offsets and lengths
        w.u8(0);
        w.u16(item_count);
        w.u16(1);
        w.u16(0);
        w.u16(1);
        extent_markers.push(w.mark_u32());
        w.u32(primary.obus.len() as u32);
        if let Some(alpha) = &alpha {
            w.u16(alpha_id);
            w.u16(0);
            w.u16(1);
            extent_markers.push(w.mark_u32());
            w.u32(alpha.obus.len() as u32);
        }
        if let Some(xmp) = xmp {
            w.u16(xmp_id);
            w.u16(0);
            w.u16(1);
            extent_markers.push(w.mark_u32());
            w.u32(xmp.len() as u32);
        }
        w.close(b);

        let b = w.open_full(b"iinf", 0, 0);
        w.u16(item_count);
        {
            let i = w.open_full(b"infe", 2, 0);
            w.u16(1);
            w.u16(0);
            w.bytes(b"av01");
            w.bytes(b"Color\0");
            w.close(i);
            if has_alpha {
                let i = w.open_full(b"infe", 2, 0);
                w.u16(alpha_id);
                w.u16(0);
                w.bytes(b"av01");
                w.bytes(b"Alpha\0");
                w.close(i);
            }
            if has_xmp {
                let i = w.open_full(b"infe", 2, 0);
                w.u16(xmp_id);
                w.u16(0);
                w.bytes(b"mime");
                w.bytes(b"XMP\0");
                w.bytes(b"application/rdf+xml\0");
                w.close(i);
            }
        }
        w.close(b);

        if has_alpha {
            let b = w.open_full(b"iref", 0, 0);
            let r = w.open(b"auxl");
            w.u16(alpha_id);
            w.u16(1);
            w.u16(1);
            w.close(r);
            w.close(b);
        }

        let b = w.open(b"iprp");
        {
            let ipco = w.open(b"ipco");
            {
                // 1: ispe
                let p = w.open_full(b"ispe", 0, 0);
                w.u32(width);
                w.u32(height);
                w.close(p);
                // 2: av1C (color)
                write_av1c(&mut w, primary.av1c);
                // 3: pixi
                let p = w.open_full(b"pixi", 0, 0);
                w.u8(3);
                w.u8(bit_depth);
                w.u8(bit_depth);
                w.u8(bit_depth);
                w.close(p);
                // 4 (optional): colr
                write_colr(&mut w, color);
                if let Some(alpha) = &alpha {
                    write_av1c(&mut w, alpha.av1c);
                    let p = w.open_full(b"auxC", 0, 0);
                    w.bytes(ALPHA_AUX_TYPE);
                    w.close(p);
                }
            }
            w.close(ipco);

            let color_props: &[u8] = if color.is_present() {
                &[1, 2, 3, 4]
            } else {
                &[1, 2, 3]
            };
            let alpha_base = if color.is_present() { 4u8 } else { 3u8 };

            let ipma = w.open_full(b"ipma", 0, 0);
            w.u32(u32::from(has_alpha) + 1);
            w.u16(1);
            w.u8(color_props.len() as u8);
            for (i, &p) in color_props.iter().enumerate() {
                // The configuration record association is essential.
                let essential = if i == 1 { 0x80 } else { 0 };
                w.u8(essential | p);
            }
            if has_alpha {
                w.u16(alpha_id);
                w.u8(3);
                w.u8(1); // shared ispe
                w.u8(0x80 | (alpha_base + 1)); // alpha av1C
                w.u8(0x80 | (alpha_base + 2)); // auxC
            }
            w.close(ipma);
        }
        w.close(b);
    }
    w.close(meta);

    let mdat = w.open(b"mdat");
    let mut offsets: Vec<usize> = Vec::new();
    offsets.push(w.position());
    w.bytes(primary.obus);
    if let Some(alpha) = &alpha {
        offsets.push(w.position());
        w.bytes(alpha.obus);
    }
    if let Some(xmp) = xmp {
        offsets.push(w.position());
        w.bytes(xmp);
    }
    w.close(mdat);

    for (&marker, &offset) in extent_markers.iter().zip(offsets.iter()) {
        w.patch_u32(marker, offset as u32);
    }
    w.finish()
}

/// One track's worth of samples for a sequence.
pub(crate) struct TrackPayload<'a> {
    pub samples: &'a [Vec<u8>],
    pub av1c: &'a [u8],
    /// Whether this is the auxiliary alpha track.
    pub alpha: bool,
}

/// Assemble an `avis` image sequence.
///
/// `durations_ms` applies to both tracks. Every sample is an
/// independently coded frame, so no `stss` is written (absence marks all
/// samples as sync samples).
pub(crate) fn pack_sequence(
    width: u32,
    height: u32,
    bit_depth: u8,
    timescale: u32,
    durations_ms: &[u32],
    color_track: TrackPayload<'_>,
    alpha_track: Option<TrackPayload<'_>>,
    color: &ColorDescription<'_>,
    xmp: Option<&[u8]>,
) -> Vec<u8> {
    let mut w = BoxWriter::new();

    let b = w.open(b"ftyp");
    w.bytes(b"avis");
    w.u32(0);
    w.bytes(b"avifavismif1miafMA1B");
    w.close(b);

    let total: u64 = durations_ms.iter().map(|&d| u64::from(d)).sum();
    let mut stco_markers: Vec<Vec<usize>> = Vec::new();

    let moov = w.open(b"moov");
    {
        let b = w.open_full(b"mvhd", 0, 0);
        w.u32(0); // creation time
        w.u32(0); // modification time
        w.u32(timescale);
        w.u32(total as u32);
        w.u32(0x0001_0000); // rate 1.0
        w.u16(0x0100); // volume
        w.u16(0);
        w.u32(0);
        w.u32(0);
        for v in IDENTITY_MATRIX {
            w.u32(v);
        }
        for _ in 0..6 {
            w.u32(0); // pre-defined
        }
        w.u32(3); // next track id
        w.close(b);

        let markers = write_trak(
            &mut w,
            1,
            width,
            height,
            bit_depth,
            timescale,
            total,
            durations_ms,
            &color_track,
            color,
            None,
        );
        stco_markers.push(markers);

        if let Some(alpha) = &alpha_track {
            let markers = write_trak(
                &mut w,
                2,
                width,
                height,
                bit_depth,
                timescale,
                total,
                durations_ms,
                alpha,
                &ColorDescription {
                    icc: None,
                    nclx: None,
                },
                Some(1),
            );
            stco_markers.push(markers);
        }
    }
    w.close(moov);

    if let Some(xmp) = xmp {
        // Sequence-level XMP rides in a meta box alongside the tracks.
        let meta = w.open_full(b"meta", 0, 0);
        let b = w.open_full(b"hdlr", 0, 0);
        w.u32(0);
        w.bytes(b"pict");
        w.u32(0);
        w.u32(0);
        w.u32(0);
        w.bytes(b"framecodec\0");
        w.close(b);
        let b = w.open(b"xml ");
        w.bytes(xmp);
        w.close(b);
        w.close(meta);
    }

    let mdat = w.open(b"mdat");
    let mut track_offsets: Vec<Vec<usize>> = Vec::new();
    let mut color_offsets = Vec::with_capacity(color_track.samples.len());
    for sample in color_track.samples {
        color_offsets.push(w.position());
        w.bytes(sample);
    }
    track_offsets.push(color_offsets);
    if let Some(alpha) = &alpha_track {
        let mut alpha_offsets = Vec::with_capacity(alpha.samples.len());
        for sample in alpha.samples {
            alpha_offsets.push(w.position());
            w.bytes(sample);
        }
        track_offsets.push(alpha_offsets);
    }
    w.close(mdat);

    for (markers, offsets) in stco_markers.iter().zip(track_offsets.iter()) {
        for (&marker, &offset) in markers.iter().zip(offsets.iter()) {
            w.patch_u32(marker, offset as u32);
        }
    }
    w.finish()
}

const IDENTITY_MATRIX: [u32; 9] = [
    0x0001_0000,
    0,
    0,
    0,
    0x0001_0000,
    0,
    0,
    0,
    0x4000_0000,
];

/// Write one `trak` and return the `stco` offset markers to patch.
#[allow(clippy::too_many_arguments)]
fn write_trak(
    w: &mut BoxWriter,
    track_id: u32,
    width: u32,
    height: u32,
    bit_depth: u8,
    timescale: u32,
    total_duration: u64,
    durations_ms: &[u32],
    payload: &TrackPayload<'_>,
    color: &ColorDescription<'_>,
    aux_for: Option<u32>,
) -> Vec<usize> {
    let trak = w.open(b"trak");

    let b = w.open_full(b"tkhd", 0, 3);
    w.u32(0);
    w.u32(0);
    w.u32(track_id);
    w.u32(0);
    w.u32(total_duration as u32);
    w.u32(0);
    w.u32(0);
    w.u16(0); // layer
    w.u16(0); // alternate group
    w.u16(0); // volume
    w.u16(0);
    for v in IDENTITY_MATRIX {
        w.u32(v);
    }
    w.u32(width << 16);
    w.u32(height << 16);
    w.close(b);

    if let Some(target) = aux_for {
        let b = w.open(b"tref");
        let r = w.open(b"auxl");
        w.u32(target);
        w.close(r);
        w.close(b);
    }

    let mdia = w.open(b"mdia");

    let b = w.open_full(b"mdhd", 0, 0);
    w.u32(0);
    w.u32(0);
    w.u32(timescale);
    w.u32(total_duration as u32);
    w.u16(0x55C4); // language: undetermined
    w.u16(0);
    w.close(b);

    let b = w.open_full(b"hdlr", 0, 0);
    w.u32(0);
    w.bytes(b"pict");
    w.u32(0);
    w.u32(0);
    w.u32(0);
    w.bytes(b"framecodec\0");
    w.close(b);

    let minf = w.open(b"minf");

    let b = w.open_full(b"vmhd", 0, 1);
    w.u16(0);
    w.u16(0);
    w.u16(0);
    w.u16(0);
    w.close(b);

    let dinf = w.open(b"dinf");
    let b = w.open_full(b"dref", 0, 0);
    w.u32(1);
    let u = w.open_full(b"url ", 0, 1); // self-contained
    w.close(u);
    w.close(b);
    w.close(dinf);

    let stbl = w.open(b"stbl");

    let b = w.open_full(b"stsd", 0, 0);
    w.u32(1);
    let entry = w.open(b"av01");
    w.bytes(&[0; 6]);
    w.u16(1); // data reference index
    w.bytes(&[0; 16]);
    w.u16(width as u16);
    w.u16(height as u16);
    w.u32(0x0048_0000); // 72 dpi
    w.u32(0x0048_0000);
    w.u32(0);
    w.u16(1); // frame count
    w.bytes(&[0; 32]); // compressor name
    w.u16(0x0018); // depth
    w.u16(0xFFFF); // pre-defined
    write_av1c(w, payload.av1c);
    write_colr(w, color);
    let p = w.open_full(b"pixi", 0, 0);
    if payload.alpha {
        w.u8(1);
        w.u8(bit_depth);
    } else {
        w.u8(3);
        w.u8(bit_depth);
        w.u8(bit_depth);
        w.u8(bit_depth);
    }
    w.close(p);
    if payload.alpha {
        let p = w.open_full(b"auxi", 0, 0);
        w.bytes(ALPHA_AUX_TYPE);
        w.close(p);
    }
    w.close(entry);
    w.close(b);

    // stts: collapse equal consecutive durations into runs.
    let b = w.open_full(b"stts", 0, 0);
    let runs = duration_runs(durations_ms, timescale);
    w.u32(runs.len() as u32);
    for (count, delta) in runs {
        w.u32(count);
        w.u32(delta);
    }
    w.close(b);

    let b = w.open_full(b"stsc", 0, 0);
    w.u32(1);
    w.u32(1); // first chunk
    w.u32(1); // one sample per chunk
    w.u32(1); // description index
    w.close(b);

    let b = w.open_full(b"stsz", 0, 0);
    w.u32(0);
    w.u32(payload.samples.len() as u32);
    for sample in payload.samples {
        w.u32(sample.len() as u32);
    }
    w.close(b);

    let b = w.open_full(b"stco", 0, 0);
    w.u32(payload.samples.len() as u32);
    let mut markers = Vec::with_capacity(payload.samples.len());
    for _ in payload.samples {
        markers.push(w.mark_u32());
    }
    w.close(b);

    w.close(stbl);
    w.close(minf);
    w.close(mdia);
    w.close(trak);
    markers
}

/// `(count, delta)` runs for `stts`, with durations converted from
/// milliseconds to timescale units.
fn duration_runs(durations_ms: &[u32], timescale: u32) -> Vec<(u32, u32)> {
    let mut runs: Vec<(u32, u32)> = Vec::new();
    for &ms in durations_ms {
        let delta = (u64::from(ms) * u64::from(timescale) / 1000) as u32;
        match runs.last_mut() {
            Some((count, last)) if *last == delta => *count += 1,
            _ => runs.push((1, delta)),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avif::boxes;

    #[test]
    fn still_round_trips_through_demux() {
        let obus = vec![0x12, 0x00, 0x0A, 0x0B];
        let av1c = vec![0x81, 0x1F, 0x0C, 0x10];
        let out = pack_still(
            64,
            32,
            8,
            ItemPayload {
                obus: &obus,
                av1c: &av1c,
            },
            None,
            &ColorDescription {
                icc: Some(&[1, 2, 3, 4]),
                nclx: None,
            },
            Some(b"<x:xmpmeta/>"),
        );
        let demuxed = boxes::demux(&out).unwrap();
        assert!(!demuxed.is_sequence);
        let still = demuxed.still.unwrap();
        assert_eq!(still.primary, obus);
        assert!(still.alpha.is_none());
        assert_eq!((demuxed.width, demuxed.height), (64, 32));
        assert_eq!(demuxed.av1c.as_deref(), Some(&av1c[..]));
        assert_eq!(demuxed.icc.as_deref(), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(demuxed.xmp.as_deref(), Some(&b"<x:xmpmeta/>"[..]));
    }

    #[test]
    fn sequence_round_trips_through_demux() {
        let samples = vec![vec![1u8, 2, 3], vec![4u8, 5], vec![6u8]];
        let av1c = vec![0x81, 0x1F, 0x0C, 0x10];
        let out = pack_sequence(
            16,
            16,
            8,
            1000,
            &[100, 100, 250],
            TrackPayload {
                samples: &samples,
                av1c: &av1c,
                alpha: false,
            },
            None,
            &ColorDescription {
                icc: None,
                nclx: None,
            },
            None,
        );
        let demuxed = boxes::demux(&out).unwrap();
        assert!(demuxed.is_sequence);
        let track = demuxed.color_track.unwrap();
        assert_eq!(track.timescale, 1000);
        assert_eq!(track.durations, vec![100, 100, 250]);
        assert_eq!(track.samples.len(), 3);
        let (off, len) = track.samples[1];
        assert_eq!(&out[off as usize..(off + len) as usize], &samples[1][..]);
    }
}
