//! ISO-BMFF demux for AVIF stills (`meta` item path) and image
//! sequences (`moov` track path).

use crate::error::DecodeError;

/// Byte cursor over the container.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        let new_pos = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        if new_pos > self.data.len() {
            return Err(DecodeError::Truncated);
        }
        self.pos = new_pos;
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let b = *self.data.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.read_fixed::<2>()?))
    }

    fn read_u24(&mut self) -> Result<u32, DecodeError> {
        let b = self.read_fixed::<3>()?;
        Ok(u32::from(b[0]) << 16 | u32::from(b[1]) << 8 | u32::from(b[2]))
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_fixed::<4>()?))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.read_fixed::<8>()?))
    }

    fn read_fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or(DecodeError::Truncated)?;
        self.pos += N;
        Ok(bytes.try_into().expect("length checked"))
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::Truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Read a variable-width unsigned value (0, 4, or 8 bytes).
    fn read_sized(&mut self, size: u8) -> Result<u64, DecodeError> {
        match size {
            0 => Ok(0),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            _ => Err(DecodeError::UnsupportedFeature(format!(
                "iloc field size {size}"
            ))),
        }
    }
}

/// `(type, body)` header of the next contained box.
fn next_box<'a>(c: &mut Cursor<'a>) -> Result<([u8; 4], &'a [u8]), DecodeError> {
    let size = c.read_u32()? as u64;
    let typ = c.read_fixed::<4>()?;
    let (header_len, size) = if size == 1 {
        (16u64, c.read_u64()?)
    } else if size == 0 {
        // Box extends to end of the enclosing container.
        (8u64, c.remaining() as u64 + 8)
    } else {
        (8u64, size)
    };
    let body_len = size
        .checked_sub(header_len)
        .ok_or_else(|| DecodeError::InvalidHeader("box smaller than its header".into()))?;
    let body_len = usize::try_from(body_len).map_err(|_| DecodeError::Truncated)?;
    let body = c.read_bytes(body_len)?;
    Ok((typ, body))
}

/// CICP color description from a `colr` box of type `nclx`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Nclx {
    pub color_primaries: u16,
    pub transfer_characteristics: u16,
    pub matrix_coefficients: u16,
    pub full_range: bool,
}

/// An extracted still item: complete AV1 temporal unit(s).
#[derive(Clone, Debug, Default)]
pub(crate) struct StillItems {
    pub primary: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

/// One track of an `avis` sequence.
#[derive(Clone, Debug, Default)]
pub(crate) struct Track {
    pub timescale: u32,
    /// Per-sample duration in timescale units.
    pub durations: Vec<u64>,
    /// Per-sample byte ranges into the file.
    pub samples: Vec<(u64, u64)>,
    pub av1c: Option<Vec<u8>>,
    pub nclx: Option<Nclx>,
    pub icc: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    /// Auxiliary (alpha) track flag from the handler/`auxi` signaling.
    pub is_alpha: bool,
    /// Track ids this track references through `auxl`.
    pub aux_for: Option<u32>,
    pub track_id: u32,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Demuxed {
    pub is_sequence: bool,
    pub still: Option<StillItems>,
    pub color_track: Option<Track>,
    pub alpha_track: Option<Track>,
    pub icc: Option<Vec<u8>>,
    pub xmp: Option<Vec<u8>>,
    pub nclx: Option<Nclx>,
    /// `av1C` body of the primary item (still path).
    pub av1c: Option<Vec<u8>>,
    pub alpha_av1c: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub alpha_premultiplied: bool,
    /// Clean-aperture horizontal/vertical offsets.
    pub clap_offset: (i32, i32),
}

/// Check the `ftyp` box for an AVIF brand.
pub(crate) fn is_avif(data: &[u8]) -> bool {
    let mut c = Cursor::new(data);
    let Ok((typ, body)) = next_box(&mut c) else {
        return false;
    };
    if &typ != b"ftyp" || body.len() < 8 {
        return false;
    }
    let brands = std::iter::once(&body[0..4])
        .chain(body[8..].chunks_exact(4));
    for brand in brands {
        if brand == b"avif" || brand == b"avis" {
            return true;
        }
    }
    false
}

/// Parse the container far enough to decode: item locations (stills),
/// track sample tables (sequences), and the color properties.
pub(crate) fn demux(data: &[u8]) -> Result<Demuxed, DecodeError> {
    if !is_avif(data) {
        return Err(DecodeError::InvalidHeader("not an AVIF brand".into()));
    }
    let mut out = Demuxed::default();

    let mut c = Cursor::new(data);
    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        match &typ {
            b"meta" => parse_meta(body, data, &mut out)?,
            b"moov" => parse_moov(body, &mut out)?,
            _ => {}
        }
    }

    out.is_sequence = out.color_track.is_some();
    if out.still.is_none() && out.color_track.is_none() {
        return Err(DecodeError::InvalidHeader(
            "neither primary item nor video track".into(),
        ));
    }
    if let Some(track) = &out.color_track {
        if out.width == 0 {
            out.width = track.width;
            out.height = track.height;
        }
        if out.av1c.is_none() {
            out.av1c = track.av1c.clone();
        }
        if out.nclx.is_none() {
            out.nclx = track.nclx;
        }
        if out.icc.is_none() {
            out.icc = track.icc.clone();
        }
    }
    if out.bit_depth == 0 {
        out.bit_depth = out
            .av1c
            .as_deref()
            .map_or(8, |c| av1c_bit_depth(c));
    }
    Ok(out)
}

/// Bit depth from the `av1C` configuration record.
fn av1c_bit_depth(av1c: &[u8]) -> u8 {
    // Byte 2: seq_profile(3) seq_level_idx(5); byte 3 starts with
    // seq_tier(1) high_bitdepth(1) twelve_bit(1).
    match av1c.get(2) {
        Some(b) if b & 0x40 != 0 => {
            if b & 0x20 != 0 {
                12
            } else {
                10
            }
        }
        Some(_) => 8,
        None => 8,
    }
}

// ── meta / item path ─────────────────────────────────────────────────

#[derive(Default)]
struct MetaState {
    primary_item: u32,
    /// item id → (offsets, lengths)
    locations: Vec<(u32, Vec<(u64, u64)>)>,
    /// item id → 4cc item type
    types: Vec<(u32, [u8; 4])>,
    /// (from_item, to_item) pairs of `auxl` references
    aux_refs: Vec<(u32, u32)>,
    /// (from_item, to_item) pairs of `prem` references
    prem_refs: Vec<(u32, u32)>,
    /// item id → property indices (1-based into ipco)
    associations: Vec<(u32, Vec<u16>)>,
    properties: Vec<([u8; 4], Vec<u8>)>,
}

fn parse_meta(body: &[u8], file: &[u8], out: &mut Demuxed) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    c.skip(4)?; // full box version/flags
    let mut st = MetaState::default();

    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        match &typ {
            b"pitm" => {
                let mut b = Cursor::new(body);
                let version = b.read_u8()?;
                b.skip(3)?;
                st.primary_item = if version == 0 {
                    u32::from(b.read_u16()?)
                } else {
                    b.read_u32()?
                };
            }
            b"iloc" => parse_iloc(body, &mut st)?,
            b"iinf" => parse_iinf(body, &mut st)?,
            b"iref" => parse_iref(body, &mut st)?,
            b"iprp" => parse_iprp(body, &mut st)?,
            b"xml " => {
                if !body.is_empty() {
                    out.xmp = Some(body.to_vec());
                }
            }
            _ => {}
        }
    }

    // Resolve the primary item and its auxiliary alpha.
    let primary = st.primary_item;
    let alpha_item = st
        .aux_refs
        .iter()
        .find(|(_, to)| *to == primary)
        .map(|(from, _)| *from);
    out.alpha_premultiplied = st
        .prem_refs
        .iter()
        .any(|(_, to)| *to == primary);

    let extract = |item: u32| -> Option<Vec<u8>> {
        let (_, extents) = st.locations.iter().find(|(id, _)| *id == item)?;
        let mut bytes = Vec::new();
        for &(offset, len) in extents {
            let start = usize::try_from(offset).ok()?;
            let end = start.checked_add(usize::try_from(len).ok()?)?;
            bytes.extend_from_slice(file.get(start..end)?);
        }
        Some(bytes)
    };

    if let Some(primary_bytes) = extract(primary) {
        out.still = Some(StillItems {
            primary: primary_bytes,
            alpha: alpha_item.and_then(|id| extract(id)),
        });
    }

    // Pull properties associated with the primary (and alpha) item.
    for (item, props) in &st.associations {
        let target_alpha = Some(*item) == alpha_item;
        if *item != primary && !target_alpha {
            continue;
        }
        for &index in props {
            let Some((typ, body)) = st.properties.get(index as usize - 1) else {
                continue;
            };
            match typ {
                b"ispe" if !target_alpha => {
                    let mut b = Cursor::new(body);
                    b.skip(4)?;
                    out.width = b.read_u32()?;
                    out.height = b.read_u32()?;
                }
                b"av1C" => {
                    if target_alpha {
                        out.alpha_av1c = Some(body.clone());
                    } else {
                        out.av1c = Some(body.clone());
                    }
                }
                b"colr" if !target_alpha => parse_colr(body, out),
                b"pixi" if !target_alpha => {
                    let mut b = Cursor::new(body);
                    b.skip(4)?;
                    let channels = b.read_u8()?;
                    if channels > 0 {
                        out.bit_depth = b.read_u8()?;
                    }
                }
                b"clap" if !target_alpha => {
                    let mut b = Cursor::new(body);
                    let _width_n = b.read_u32()?;
                    let _width_d = b.read_u32()?;
                    let _height_n = b.read_u32()?;
                    let _height_d = b.read_u32()?;
                    let horiz_n = b.read_u32()? as i32;
                    let horiz_d = b.read_u32()? as i32;
                    let vert_n = b.read_u32()? as i32;
                    let vert_d = b.read_u32()? as i32;
                    if horiz_d != 0 && vert_d != 0 {
                        out.clap_offset = (horiz_n / horiz_d, vert_n / vert_d);
                    }
                }
                _ => {}
            }
        }
    }

    // XMP rides as an item of type `mime`.
    let xmp_item = st
        .types
        .iter()
        .find(|(_, t)| t == b"mime")
        .map(|(id, _)| *id);
    if let Some(id) = xmp_item {
        out.xmp = extract(id).filter(|x| !x.is_empty());
    }
    Ok(())
}

fn parse_iloc(body: &[u8], st: &mut MetaState) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    let version = c.read_u8()?;
    c.skip(3)?;
    let sizes = c.read_u8()?;
    let offset_size = sizes >> 4;
    let length_size = sizes & 0x0F;
    let sizes2 = c.read_u8()?;
    let base_offset_size = sizes2 >> 4;
    let index_size = if version >= 1 { sizes2 & 0x0F } else { 0 };
    let item_count = if version < 2 {
        u32::from(c.read_u16()?)
    } else {
        c.read_u32()?
    };

    for _ in 0..item_count {
        let item_id = if version < 2 {
            u32::from(c.read_u16()?)
        } else {
            c.read_u32()?
        };
        let mut construction_method = 0u16;
        if version >= 1 {
            construction_method = c.read_u16()? & 0x0F;
        }
        let _data_ref_index = c.read_u16()?;
        let base_offset = c.read_sized(base_offset_size)?;
        let extent_count = c.read_u16()?;
        let mut extents = Vec::with_capacity(extent_count as usize);
        for _ in 0..extent_count {
            if index_size > 0 {
                let _extent_index = c.read_sized(index_size)?;
            }
            let offset = c.read_sized(offset_size)?;
            let length = c.read_sized(length_size)?;
            let start = base_offset
                .checked_add(offset)
                .ok_or(DecodeError::Truncated)?;
            extents.push((start, length));
        }
        if construction_method != 0 {
            return Err(DecodeError::UnsupportedFeature(
                "iloc construction method".into(),
            ));
        }
        st.locations.push((item_id, extents));
    }
    Ok(())
}

fn parse_iinf(body: &[u8], st: &mut MetaState) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    let version = c.read_u8()?;
    c.skip(3)?;
    let count = if version == 0 {
        u32::from(c.read_u16()?)
    } else {
        c.read_u32()?
    };
    for _ in 0..count {
        let (typ, body) = next_box(&mut c)?;
        if &typ != b"infe" {
            continue;
        }
        let mut b = Cursor::new(body);
        let infe_version = b.read_u8()?;
        b.skip(3)?;
        if infe_version < 2 {
            continue;
        }
        let item_id = if infe_version == 2 {
            u32::from(b.read_u16()?)
        } else {
            b.read_u32()?
        };
        let _protection = b.read_u16()?;
        let item_type = b.read_fixed::<4>()?;
        st.types.push((item_id, item_type));
    }
    Ok(())
}

fn parse_iref(body: &[u8], st: &mut MetaState) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    let version = c.read_u8()?;
    c.skip(3)?;
    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        let mut b = Cursor::new(body);
        let from = if version == 0 {
            u32::from(b.read_u16()?)
        } else {
            b.read_u32()?
        };
        let count = b.read_u16()?;
        for _ in 0..count {
            let to = if version == 0 {
                u32::from(b.read_u16()?)
            } else {
                b.read_u32()?
            };
            match &typ {
                b"auxl" => st.aux_refs.push((from, to)),
                b"prem" => st.prem_refs.push((from, to)),
                _ => {}
            }
        }
    }
    Ok(())
}

fn parse_iprp(body: &[u8], st: &mut MetaState) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        match &typ {
            b"ipco" => {
                let mut b = Cursor::new(body);
                while b.remaining() >= 8 {
                    let (ptyp, pbody) = next_box(&mut b)?;
                    st.properties.push((ptyp, pbody.to_vec()));
                }
            }
            b"ipma" => {
                let mut b = Cursor::new(body);
                let version = b.read_u8()?;
                let flags = b.read_u24()?;
                let count = b.read_u32()?;
                for _ in 0..count {
                    let item_id = if version == 0 {
                        u32::from(b.read_u16()?)
                    } else {
                        b.read_u32()?
                    };
                    let assoc_count = b.read_u8()?;
                    let mut props = Vec::with_capacity(assoc_count as usize);
                    for _ in 0..assoc_count {
                        let index = if flags & 1 != 0 {
                            b.read_u16()? & 0x7FFF
                        } else {
                            u16::from(b.read_u8()?) & 0x7F
                        };
                        if index != 0 {
                            props.push(index);
                        }
                    }
                    st.associations.push((item_id, props));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_colr(body: &[u8], out: &mut Demuxed) {
    if body.len() >= 4 && &body[0..4] == b"nclx" && body.len() >= 11 {
        out.nclx = Some(Nclx {
            color_primaries: u16::from_be_bytes([body[4], body[5]]),
            transfer_characteristics: u16::from_be_bytes([body[6], body[7]]),
            matrix_coefficients: u16::from_be_bytes([body[8], body[9]]),
            full_range: body[10] & 0x80 != 0,
        });
    } else if body.len() > 4 && (&body[0..4] == b"prof" || &body[0..4] == b"rICC") {
        out.icc = Some(body[4..].to_vec());
    }
}

// ── moov / track path ────────────────────────────────────────────────

fn parse_moov(body: &[u8], out: &mut Demuxed) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    let mut tracks = Vec::new();
    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        if &typ == b"trak" {
            tracks.push(parse_trak(body)?);
        }
    }

    // Color track: a 'pict'/'vide' track that is not an aux track.
    let color = tracks.iter().position(|t| !t.is_alpha);
    if let Some(ci) = color {
        let color_id = tracks[ci].track_id;
        let alpha = tracks
            .iter()
            .position(|t| t.is_alpha && t.aux_for.is_none_or(|id| id == color_id));
        // Remove in descending index order to keep positions valid.
        let (color_track, alpha_track) = match alpha {
            Some(ai) => {
                let (first, second) = (ci.min(ai), ci.max(ai));
                let mut second_track = tracks.swap_remove(second);
                let mut first_track = tracks.swap_remove(first);
                if ai < ci {
                    std::mem::swap(&mut first_track, &mut second_track);
                }
                (first_track, Some(second_track))
            }
            None => (tracks.swap_remove(ci), None),
        };
        out.color_track = Some(color_track);
        out.alpha_track = alpha_track;
    }
    Ok(())
}

fn parse_trak(body: &[u8]) -> Result<Track, DecodeError> {
    let mut track = Track::default();
    let mut c = Cursor::new(body);
    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        match &typ {
            b"tkhd" => {
                let mut b = Cursor::new(body);
                let version = b.read_u8()?;
                b.skip(3)?;
                if version == 1 {
                    b.skip(8 + 8)?;
                    track.track_id = b.read_u32()?;
                } else {
                    b.skip(4 + 4)?;
                    track.track_id = b.read_u32()?;
                }
            }
            b"tref" => {
                let mut b = Cursor::new(body);
                while b.remaining() >= 8 {
                    let (rtyp, rbody) = next_box(&mut b)?;
                    if &rtyp == b"auxl" && rbody.len() >= 4 {
                        track.aux_for = Some(u32::from_be_bytes(
                            rbody[0..4].try_into().expect("length checked"),
                        ));
                        track.is_alpha = true;
                    }
                }
            }
            b"mdia" => parse_mdia(body, &mut track)?,
            _ => {}
        }
    }
    Ok(track)
}

fn parse_mdia(body: &[u8], track: &mut Track) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        match &typ {
            b"mdhd" => {
                let mut b = Cursor::new(body);
                let version = b.read_u8()?;
                b.skip(3)?;
                if version == 1 {
                    b.skip(8 + 8)?;
                    track.timescale = b.read_u32()?;
                } else {
                    b.skip(4 + 4)?;
                    track.timescale = b.read_u32()?;
                }
            }
            b"minf" => {
                let mut b = Cursor::new(body);
                while b.remaining() >= 8 {
                    let (mtyp, mbody) = next_box(&mut b)?;
                    if &mtyp == b"stbl" {
                        parse_stbl(mbody, track)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_stbl(body: &[u8], track: &mut Track) -> Result<(), DecodeError> {
    let mut c = Cursor::new(body);
    let mut sizes: Vec<u64> = Vec::new();
    let mut chunk_offsets: Vec<u64> = Vec::new();
    // (first_chunk, samples_per_chunk)
    let mut sample_to_chunk: Vec<(u32, u32)> = Vec::new();

    while c.remaining() >= 8 {
        let (typ, body) = next_box(&mut c)?;
        let mut b = Cursor::new(body);
        match &typ {
            b"stsd" => {
                b.skip(4)?;
                let entry_count = b.read_u32()?;
                if entry_count > 0 {
                    let (etyp, ebody) = next_box(&mut b)?;
                    if &etyp == b"av01" {
                        parse_av01_entry(ebody, track)?;
                    }
                }
            }
            b"stts" => {
                b.skip(4)?;
                let count = b.read_u32()?;
                for _ in 0..count {
                    let sample_count = b.read_u32()?;
                    let delta = b.read_u32()?;
                    for _ in 0..sample_count {
                        track.durations.push(u64::from(delta));
                    }
                }
            }
            b"stsz" => {
                b.skip(4)?;
                let uniform = b.read_u32()?;
                let count = b.read_u32()?;
                if uniform != 0 {
                    sizes = vec![u64::from(uniform); count as usize];
                } else {
                    for _ in 0..count {
                        sizes.push(u64::from(b.read_u32()?));
                    }
                }
            }
            b"stsc" => {
                b.skip(4)?;
                let count = b.read_u32()?;
                for _ in 0..count {
                    let first_chunk = b.read_u32()?;
                    let samples_per_chunk = b.read_u32()?;
                    let _desc_index = b.read_u32()?;
                    sample_to_chunk.push((first_chunk, samples_per_chunk));
                }
            }
            b"stco" => {
                b.skip(4)?;
                let count = b.read_u32()?;
                for _ in 0..count {
                    chunk_offsets.push(u64::from(b.read_u32()?));
                }
            }
            b"co64" => {
                b.skip(4)?;
                let count = b.read_u32()?;
                for _ in 0..count {
                    chunk_offsets.push(b.read_u64()?);
                }
            }
            _ => {}
        }
    }

    // Lay samples out across chunks.
    let mut samples = Vec::with_capacity(sizes.len());
    let mut sample_index = 0usize;
    for (chunk_index, &chunk_offset) in chunk_offsets.iter().enumerate() {
        let chunk_number = chunk_index as u32 + 1;
        let per_chunk = sample_to_chunk
            .iter()
            .rev()
            .find(|(first, _)| *first <= chunk_number)
            .map_or(1, |(_, n)| *n);
        let mut offset = chunk_offset;
        for _ in 0..per_chunk {
            if sample_index >= sizes.len() {
                break;
            }
            samples.push((offset, sizes[sample_index]));
            offset += sizes[sample_index];
            sample_index += 1;
        }
    }
    track.samples = samples;
    Ok(())
}

fn parse_av01_entry(body: &[u8], track: &mut Track) -> Result<(), DecodeError> {
    // VisualSampleEntry: 6 reserved + data_ref_index, then 16 bytes of
    // pre-defined/reserved, width/height, resolution, frame count,
    // compressor name (32), depth + pre-defined; child boxes follow.
    let mut b = Cursor::new(body);
    b.skip(6 + 2 + 16)?;
    track.width = u32::from(b.read_u16()?);
    track.height = u32::from(b.read_u16()?);
    b.skip(4 + 4 + 4 + 2 + 32 + 2 + 2)?;
    while b.remaining() >= 8 {
        let (typ, cbody) = next_box(&mut b)?;
        match &typ {
            b"av1C" => track.av1c = Some(cbody.to_vec()),
            b"colr" => {
                let mut tmp = Demuxed::default();
                parse_colr(cbody, &mut tmp);
                track.nclx = tmp.nclx;
                track.icc = tmp.icc;
            }
            b"auxi" => track.is_alpha = true,
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brand_detection() {
        let mut data = Vec::new();
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(b"ftypavif");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mif1");
        assert!(is_avif(&data));

        let mut data = Vec::new();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"ftypisom");
        data.extend_from_slice(&0u32.to_be_bytes());
        assert!(!is_avif(&data));
    }

    #[test]
    fn iloc_extent_offset_overflow_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"ftypavif");
        data.extend_from_slice(&0u32.to_be_bytes());

        // iloc with 8-byte fields whose base offset + extent offset
        // overflows u64.
        let mut iloc = Vec::new();
        iloc.push(1); // version
        iloc.extend_from_slice(&[0; 3]); // flags
        iloc.push(0x88); // offset_size 8, length_size 8
        iloc.push(0x80); // base_offset_size 8, index_size 0
        iloc.extend_from_slice(&1u16.to_be_bytes()); // item count
        iloc.extend_from_slice(&1u16.to_be_bytes()); // item id
        iloc.extend_from_slice(&0u16.to_be_bytes()); // construction method
        iloc.extend_from_slice(&0u16.to_be_bytes()); // data reference index
        iloc.extend_from_slice(&u64::MAX.to_be_bytes()); // base offset
        iloc.extend_from_slice(&1u16.to_be_bytes()); // extent count
        iloc.extend_from_slice(&1u64.to_be_bytes()); // extent offset
        iloc.extend_from_slice(&0u64.to_be_bytes()); // extent length

        data.extend_from_slice(&(8 + 4 + 8 + iloc.len() as u32).to_be_bytes());
        data.extend_from_slice(b"meta");
        data.extend_from_slice(&[0; 4]); // version/flags
        data.extend_from_slice(&(8 + iloc.len() as u32).to_be_bytes());
        data.extend_from_slice(b"iloc");
        data.extend_from_slice(&iloc);

        assert!(matches!(demux(&data), Err(DecodeError::Truncated)));
    }
}
