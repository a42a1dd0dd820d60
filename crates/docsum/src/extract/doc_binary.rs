//! Word 97-2003 binary documents (OLE compound files).
//!
//! Text lives in the `WordDocument` stream as a sequence of pieces. The piece
//! table sits in the CLX structure of the `0Table` or `1Table` stream, located
//! through the FIB at the start of `WordDocument`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::{UTF_16LE, WINDOWS_1252};

use crate::error::ExtractError;

const WORD_DOCUMENT: &str = "/WordDocument";

const FIB_MAGIC: u16 = 0xA5EC;
const FIB_FLAGS_OFFSET: usize = 0x0A;
const FLAG_WHICH_TABLE: u16 = 0x0200;
const FIB_BASE_LEN: usize = 32;
/// `ccpText` within FibRgLw97.
const CCP_TEXT_INDEX: usize = 3;
/// `fcClx` within FibRgFcLcb97, counted in u32 slots.
const FC_CLX_INDEX: usize = 66;

const CLX_PRC: u8 = 0x01;
const CLX_PCDT: u8 = 0x02;
const PCD_LEN: usize = 8;
const FC_COMPRESSED: u32 = 0x4000_0000;

const FIELD_BEGIN: char = '\u{13}';
const FIELD_SEPARATOR: char = '\u{14}';
const FIELD_END: char = '\u{15}';

pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let file = File::open(path).map_err(ExtractError::TempFile)?;
    let mut compound = cfb::CompoundFile::open(file)
        .map_err(|e| ExtractError::Doc(format!("Not an OLE compound file: {}", e)))?;

    let word_document = read_stream(&mut compound, WORD_DOCUMENT)?;
    let fib = Fib::parse(&word_document)?;
    let table = read_stream(&mut compound, fib.table_stream())?;

    let clx = slice(&table, fib.fc_clx as usize, fib.lcb_clx as usize)
        .ok_or_else(|| ExtractError::Doc("CLX lies outside the table stream".to_string()))?;
    let pieces = parse_piece_table(clx)?;

    let raw = read_pieces(&word_document, &pieces, fib.ccp_text)?;
    Ok(clean_text(&raw))
}

fn read_stream<F: Read + std::io::Seek>(
    compound: &mut cfb::CompoundFile<F>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let mut stream = compound
        .open_stream(name)
        .map_err(|e| ExtractError::Doc(format!("Missing stream {}: {}", name, e)))?;
    let mut bytes = Vec::new();
    stream
        .read_to_end(&mut bytes)
        .map_err(|e| ExtractError::Doc(format!("Failed to read {}: {}", name, e)))?;
    Ok(bytes)
}

fn slice(bytes: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    bytes.get(offset..offset.checked_add(len)?)
}

fn u16_at(bytes: &[u8], offset: usize) -> Option<u16> {
    slice(bytes, offset, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(bytes: &[u8], offset: usize) -> Option<u32> {
    slice(bytes, offset, 4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

// ─── FIB ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Fib {
    use_1table: bool,
    ccp_text: u32,
    fc_clx: u32,
    lcb_clx: u32,
}

impl Fib {
    fn parse(word_document: &[u8]) -> Result<Self, ExtractError> {
        let truncated = || ExtractError::Doc("truncated FIB".to_string());

        let ident = u16_at(word_document, 0).ok_or_else(truncated)?;
        if ident != FIB_MAGIC {
            return Err(ExtractError::Doc(format!(
                "unexpected FIB identifier {:#06x}",
                ident
            )));
        }
        let flags = u16_at(word_document, FIB_FLAGS_OFFSET).ok_or_else(truncated)?;

        // FibBase, then three length-prefixed arrays: rgW (u16), rgLw (u32), rgFcLcb (u32)
        let mut pos = FIB_BASE_LEN;
        let csw = u16_at(word_document, pos).ok_or_else(truncated)? as usize;
        pos += 2 + csw * 2;

        let cslw = u16_at(word_document, pos).ok_or_else(truncated)? as usize;
        let rg_lw = pos + 2;
        pos = rg_lw + cslw * 4;
        let ccp_text = if cslw > CCP_TEXT_INDEX {
            u32_at(word_document, rg_lw + CCP_TEXT_INDEX * 4).ok_or_else(truncated)?
        } else {
            0
        };

        let cb_rg_fc_lcb = u16_at(word_document, pos).ok_or_else(truncated)? as usize;
        let rg_fc_lcb = pos + 2;
        if cb_rg_fc_lcb * 2 < FC_CLX_INDEX + 2 {
            return Err(ExtractError::Doc(
                "FIB does not locate a piece table".to_string(),
            ));
        }

        Ok(Self {
            use_1table: flags & FLAG_WHICH_TABLE != 0,
            ccp_text,
            fc_clx: u32_at(word_document, rg_fc_lcb + FC_CLX_INDEX * 4).ok_or_else(truncated)?,
            lcb_clx: u32_at(word_document, rg_fc_lcb + (FC_CLX_INDEX + 1) * 4)
                .ok_or_else(truncated)?,
        })
    }

    fn table_stream(&self) -> &'static str {
        if self.use_1table {
            "/1Table"
        } else {
            "/0Table"
        }
    }
}

// ─── Piece table ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Piece {
    cp_start: u32,
    cp_end: u32,
    /// Byte offset into `WordDocument`.
    offset: usize,
    compressed: bool,
}

fn parse_piece_table(clx: &[u8]) -> Result<Vec<Piece>, ExtractError> {
    let malformed = |what: &str| ExtractError::Doc(format!("malformed CLX: {}", what));

    let mut pos = 0;
    while pos < clx.len() {
        match clx[pos] {
            CLX_PRC => {
                let cb = u16_at(clx, pos + 1).ok_or_else(|| malformed("Prc size"))? as i16;
                if cb < 0 {
                    return Err(malformed("negative Prc size"));
                }
                pos += 3 + cb as usize;
            }
            CLX_PCDT => {
                let lcb = u32_at(clx, pos + 1).ok_or_else(|| malformed("Pcdt size"))? as usize;
                let plc = slice(clx, pos + 5, lcb).ok_or_else(|| malformed("PlcPcd bounds"))?;
                return parse_plc_pcd(plc).ok_or_else(|| malformed("PlcPcd layout"));
            }
            other => return Err(malformed(&format!("unknown entry {:#04x}", other))),
        }
    }

    Err(malformed("no Pcdt"))
}

fn parse_plc_pcd(plc: &[u8]) -> Option<Vec<Piece>> {
    if plc.len() < 4 || (plc.len() - 4) % (4 + PCD_LEN) != 0 {
        return None;
    }
    let count = (plc.len() - 4) / (4 + PCD_LEN);
    let pcd_base = (count + 1) * 4;

    (0..count)
        .map(|i| {
            let fc = u32_at(plc, pcd_base + i * PCD_LEN + 2)?;
            let compressed = fc & FC_COMPRESSED != 0;
            let fc = fc & !(FC_COMPRESSED | 0x8000_0000);
            Some(Piece {
                cp_start: u32_at(plc, i * 4)?,
                cp_end: u32_at(plc, (i + 1) * 4)?,
                offset: if compressed { fc as usize / 2 } else { fc as usize },
                compressed,
            })
        })
        .collect()
}

/// Decodes the pieces in CP order, stopping at `ccp_text` characters of main
/// document text when the FIB provides it.
fn read_pieces(
    word_document: &[u8],
    pieces: &[Piece],
    ccp_text: u32,
) -> Result<String, ExtractError> {
    let mut out = String::new();

    for piece in pieces {
        let mut end = piece.cp_end;
        if ccp_text > 0 {
            if piece.cp_start >= ccp_text {
                break;
            }
            end = end.min(ccp_text);
        }
        let chars = end.saturating_sub(piece.cp_start) as usize;
        let width = if piece.compressed { 1 } else { 2 };

        let bytes = slice(word_document, piece.offset, chars * width)
            .ok_or_else(|| ExtractError::Doc("piece lies outside WordDocument".to_string()))?;

        let encoding = if piece.compressed { WINDOWS_1252 } else { UTF_16LE };
        let (text, _) = encoding.decode_without_bom_handling(bytes);
        out.push_str(&text);
    }

    Ok(out)
}

// ─── Cleanup ────────────────────────────────────────────────────────────────

/// Drops field instructions (keeping field results) and maps Word's control
/// characters to plain newlines and tabs.
fn clean_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    // one entry per open field: true while still inside its instruction part
    let mut fields: Vec<bool> = Vec::new();

    for c in raw.chars() {
        match c {
            FIELD_BEGIN => fields.push(true),
            FIELD_SEPARATOR => {
                if let Some(top) = fields.last_mut() {
                    *top = false;
                }
            }
            FIELD_END => {
                fields.pop();
            }
            _ if fields.iter().any(|&in_instruction| in_instruction) => {}
            '\r' | '\u{0b}' | '\u{0c}' => out.push('\n'),
            '\u{07}' => out.push('\t'),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    out
}
