//! The DirectDraw Surface container: the legacy 128-byte header and the
//! optional 20-byte DX10 extension, serialized little-endian.

use std::io::{Read, Write};

use anyhow::{ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub const FOURCC_DDS: u32 = make_fourcc(b"DDS ");
pub const FOURCC_DXT1: u32 = make_fourcc(b"DXT1");
pub const FOURCC_DXT3: u32 = make_fourcc(b"DXT3");
pub const FOURCC_DXT5: u32 = make_fourcc(b"DXT5");
pub const FOURCC_ATI1: u32 = make_fourcc(b"ATI1");
pub const FOURCC_ATI2: u32 = make_fourcc(b"ATI2");
pub const FOURCC_DX10: u32 = make_fourcc(b"DX10");
const FOURCC_UVER: u32 = make_fourcc(b"UVER");

// Header flags.
const DDSD_CAPS: u32 = 0x0000_0001;
const DDSD_HEIGHT: u32 = 0x0000_0002;
const DDSD_WIDTH: u32 = 0x0000_0004;
const DDSD_PITCH: u32 = 0x0000_0008;
const DDSD_PIXELFORMAT: u32 = 0x0000_1000;
const DDSD_MIPMAPCOUNT: u32 = 0x0002_0000;
const DDSD_LINEARSIZE: u32 = 0x0008_0000;
const DDSD_DEPTH: u32 = 0x0080_0000;

// Pixel format flags. The sRGB bit is a vendor extension.
const DDPF_ALPHAPIXELS: u32 = 0x0000_0001;
const DDPF_FOURCC: u32 = 0x0000_0004;
const DDPF_RGB: u32 = 0x0000_0040;
const DDPF_SRGB: u32 = 0x4000_0000;

// Caps.
const DDSCAPS_COMPLEX: u32 = 0x0000_0008;
const DDSCAPS_TEXTURE: u32 = 0x0000_1000;
const DDSCAPS_MIPMAP: u32 = 0x0040_0000;
const DDSCAPS2_CUBEMAP: u32 = 0x0000_0200;
const DDSCAPS2_CUBEMAP_ALL_FACES: u32 = 0x0000_fc00;

// DX10 resource dimension.
const D3D10_RESOURCE_DIMENSION_TEXTURE2D: u32 = 3;
const D3D10_MISC_TEXTURECUBE: u32 = 4;

// Vendor extensions in the reserved area.
const RESERVED_NORMAL: usize = 3;
const RESERVED_SWIZZLE: usize = 4;
const RESERVED_VERSION_MAGIC: usize = 5;
const RESERVED_VERSION: usize = 6;
const NORMAL_FLAG: u32 = 1;

pub const fn make_fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32)
        | ((code[1] as u32) << 8)
        | ((code[2] as u32) << 16)
        | ((code[3] as u32) << 24)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DdsPixelFormat {
    pub size: u32,
    pub flags: u32,
    pub fourcc: u32,
    pub bitcount: u32,
    pub rmask: u32,
    pub gmask: u32,
    pub bmask: u32,
    pub amask: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DdsCaps {
    pub caps1: u32,
    pub caps2: u32,
    pub caps3: u32,
    pub caps4: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DdsHeader10 {
    pub dxgi_format: u32,
    pub resource_dimension: u32,
    pub misc_flag: u32,
    pub array_size: u32,
    pub misc_flags2: u32,
}

/// The DDS file header. Constructed through the setters, then written with
/// [`DdsHeader::write_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DdsHeader {
    pub fourcc: u32,
    pub size: u32,
    pub flags: u32,
    pub height: u32,
    pub width: u32,
    /// Pitch for uncompressed formats, linear size for block formats.
    pub pitch: u32,
    pub depth: u32,
    pub mipmapcount: u32,
    pub reserved: [u32; 11],
    pub pf: DdsPixelFormat,
    pub caps: DdsCaps,
    pub notused: u32,
    pub header10: Option<DdsHeader10>,
}

impl Default for DdsHeader {
    fn default() -> Self {
        Self {
            fourcc: FOURCC_DDS,
            size: 124,
            flags: DDSD_CAPS | DDSD_PIXELFORMAT,
            height: 0,
            width: 0,
            pitch: 0,
            depth: 0,
            mipmapcount: 0,
            reserved: [0; 11],
            pf: DdsPixelFormat { size: 32, ..Default::default() },
            caps: DdsCaps::default(),
            notused: 0,
            header10: None,
        }
    }
}

impl DdsHeader {
    pub const LEGACY_SIZE: usize = 128;
    pub const DX10_SIZE: usize = 148;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_width(&mut self, width: u32) {
        self.flags |= DDSD_WIDTH;
        self.width = width;
    }

    pub fn set_height(&mut self, height: u32) {
        self.flags |= DDSD_HEIGHT;
        self.height = height;
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.flags |= DDSD_DEPTH;
        self.depth = depth;
    }

    pub fn set_mipmap_count(&mut self, count: u32) {
        self.flags |= DDSD_MIPMAPCOUNT;
        self.mipmapcount = count;
        if count > 1 {
            self.caps.caps1 |= DDSCAPS_COMPLEX | DDSCAPS_MIPMAP;
        }
    }

    /// Linear size of the top-level surface; mutually exclusive with
    /// pitch.
    pub fn set_linear_size(&mut self, size: u32) {
        self.flags &= !DDSD_PITCH;
        self.flags |= DDSD_LINEARSIZE;
        self.pitch = size;
    }

    /// Row pitch of the top-level surface; mutually exclusive with linear
    /// size.
    pub fn set_pitch(&mut self, pitch: u32) {
        self.flags &= !DDSD_LINEARSIZE;
        self.flags |= DDSD_PITCH;
        self.pitch = pitch;
    }

    pub fn set_fourcc(&mut self, code: &[u8; 4]) {
        self.pf.flags = DDPF_FOURCC;
        self.pf.fourcc = make_fourcc(code);
        self.pf.bitcount = 0;
        self.pf.rmask = 0;
        self.pf.gmask = 0;
        self.pf.bmask = 0;
        self.pf.amask = 0;
    }

    pub fn set_pixel_format(&mut self, bitcount: u32, rmask: u32, gmask: u32, bmask: u32, amask: u32) {
        debug_assert!(bitcount > 0 && bitcount <= 32);
        self.pf.flags = DDPF_RGB;
        if amask != 0 {
            self.pf.flags |= DDPF_ALPHAPIXELS;
        }
        self.pf.fourcc = 0;
        self.pf.bitcount = bitcount;
        self.pf.rmask = rmask;
        self.pf.gmask = gmask;
        self.pf.bmask = bmask;
        self.pf.amask = amask;
    }

    /// Store a raw D3D format code, used for the float formats that have
    /// no mask representation.
    pub fn set_format_code(&mut self, code: u32) {
        self.pf.flags = DDPF_FOURCC;
        self.pf.fourcc = code;
        self.pf.bitcount = 0;
        self.pf.rmask = 0;
        self.pf.gmask = 0;
        self.pf.bmask = 0;
        self.pf.amask = 0;
    }

    /// Mark the pixel data as sRGB-encoded (vendor extension).
    pub fn set_srgb_flag(&mut self, srgb: bool) {
        if srgb {
            self.pf.flags |= DDPF_SRGB;
        } else {
            self.pf.flags &= !DDPF_SRGB;
        }
    }

    /// Switch to the DX10 extended header with the given DXGI format.
    pub fn set_dx10_format(&mut self, dxgi_format: u32) {
        self.pf.flags = DDPF_FOURCC;
        self.pf.fourcc = FOURCC_DX10;
        let header10 = self.header10.get_or_insert(DdsHeader10 {
            resource_dimension: D3D10_RESOURCE_DIMENSION_TEXTURE2D,
            array_size: 1,
            ..Default::default()
        });
        header10.dxgi_format = dxgi_format;
    }

    pub fn set_texture_2d(&mut self) {
        self.caps.caps1 |= DDSCAPS_TEXTURE;
        if let Some(h10) = &mut self.header10 {
            h10.resource_dimension = D3D10_RESOURCE_DIMENSION_TEXTURE2D;
            h10.array_size = 1;
        }
    }

    pub fn set_texture_cube(&mut self) {
        self.caps.caps1 |= DDSCAPS_TEXTURE | DDSCAPS_COMPLEX;
        self.caps.caps2 |= DDSCAPS2_CUBEMAP | DDSCAPS2_CUBEMAP_ALL_FACES;
        if let Some(h10) = &mut self.header10 {
            h10.resource_dimension = D3D10_RESOURCE_DIMENSION_TEXTURE2D;
            h10.misc_flag |= D3D10_MISC_TEXTURECUBE;
            h10.array_size = 1;
        }
    }

    /// Mark the surface as a normal map (vendor extension, bit 0 of a
    /// reserved dword).
    pub fn set_normal_flag(&mut self, normal: bool) {
        if normal {
            self.reserved[RESERVED_NORMAL] |= NORMAL_FLAG;
        } else {
            self.reserved[RESERVED_NORMAL] &= !NORMAL_FLAG;
        }
    }

    pub fn has_normal_flag(&self) -> bool {
        self.reserved[RESERVED_NORMAL] & NORMAL_FLAG != 0
    }

    /// Four packed ASCII bytes describing the channel swizzle the decoder
    /// should apply (vendor extension).
    pub fn set_swizzle_code(&mut self, code: &[u8; 4]) {
        self.reserved[RESERVED_SWIZZLE] = make_fourcc(code);
    }

    /// Caller-defined version stamp (vendor extension, magic-prefixed).
    pub fn set_user_version(&mut self, version: u32) {
        self.reserved[RESERVED_VERSION_MAGIC] = FOURCC_UVER;
        self.reserved[RESERVED_VERSION] = version;
    }

    pub fn user_version(&self) -> Option<u32> {
        if self.reserved[RESERVED_VERSION_MAGIC] == FOURCC_UVER {
            Some(self.reserved[RESERVED_VERSION])
        } else {
            None
        }
    }

    pub fn set_has_alpha_flag(&mut self, has_alpha: bool) {
        if has_alpha {
            self.pf.flags |= DDPF_ALPHAPIXELS;
        } else {
            self.pf.flags &= !DDPF_ALPHAPIXELS;
        }
    }

    pub fn has_dx10_header(&self) -> bool {
        self.header10.is_some()
    }

    /// Size of the serialized header in bytes.
    pub fn byte_size(&self) -> usize {
        if self.has_dx10_header() {
            Self::DX10_SIZE
        } else {
            Self::LEGACY_SIZE
        }
    }

    /// Serialize little-endian. On big-endian hosts this is where every
    /// multi-byte field gets swapped.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer
            .write_u32::<LittleEndian>(self.fourcc)
            .context("could not write dds header")?;
        writer.write_u32::<LittleEndian>(self.size)?;
        writer.write_u32::<LittleEndian>(self.flags)?;
        writer.write_u32::<LittleEndian>(self.height)?;
        writer.write_u32::<LittleEndian>(self.width)?;
        writer.write_u32::<LittleEndian>(self.pitch)?;
        writer.write_u32::<LittleEndian>(self.depth)?;
        writer.write_u32::<LittleEndian>(self.mipmapcount)?;
        for value in self.reserved {
            writer.write_u32::<LittleEndian>(value)?;
        }
        writer.write_u32::<LittleEndian>(self.pf.size)?;
        writer.write_u32::<LittleEndian>(self.pf.flags)?;
        writer.write_u32::<LittleEndian>(self.pf.fourcc)?;
        writer.write_u32::<LittleEndian>(self.pf.bitcount)?;
        writer.write_u32::<LittleEndian>(self.pf.rmask)?;
        writer.write_u32::<LittleEndian>(self.pf.gmask)?;
        writer.write_u32::<LittleEndian>(self.pf.bmask)?;
        writer.write_u32::<LittleEndian>(self.pf.amask)?;
        writer.write_u32::<LittleEndian>(self.caps.caps1)?;
        writer.write_u32::<LittleEndian>(self.caps.caps2)?;
        writer.write_u32::<LittleEndian>(self.caps.caps3)?;
        writer.write_u32::<LittleEndian>(self.caps.caps4)?;
        writer.write_u32::<LittleEndian>(self.notused)?;

        if let Some(h10) = &self.header10 {
            writer.write_u32::<LittleEndian>(h10.dxgi_format)?;
            writer.write_u32::<LittleEndian>(h10.resource_dimension)?;
            writer.write_u32::<LittleEndian>(h10.misc_flag)?;
            writer.write_u32::<LittleEndian>(h10.array_size)?;
            writer.write_u32::<LittleEndian>(h10.misc_flags2)?;
        }
        Ok(())
    }

    /// Read a header back, including the DX10 trailer when the FourCC
    /// announces it.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = DdsHeader::default();
        header.fourcc = reader
            .read_u32::<LittleEndian>()
            .context("could not read dds header")?;
        ensure!(header.fourcc == FOURCC_DDS, "missing DDS magic");
        header.size = reader.read_u32::<LittleEndian>()?;
        ensure!(header.size == 124, "unexpected dds header size {}", header.size);
        header.flags = reader.read_u32::<LittleEndian>()?;
        header.height = reader.read_u32::<LittleEndian>()?;
        header.width = reader.read_u32::<LittleEndian>()?;
        header.pitch = reader.read_u32::<LittleEndian>()?;
        header.depth = reader.read_u32::<LittleEndian>()?;
        header.mipmapcount = reader.read_u32::<LittleEndian>()?;
        for value in &mut header.reserved {
            *value = reader.read_u32::<LittleEndian>()?;
        }
        header.pf.size = reader.read_u32::<LittleEndian>()?;
        header.pf.flags = reader.read_u32::<LittleEndian>()?;
        header.pf.fourcc = reader.read_u32::<LittleEndian>()?;
        header.pf.bitcount = reader.read_u32::<LittleEndian>()?;
        header.pf.rmask = reader.read_u32::<LittleEndian>()?;
        header.pf.gmask = reader.read_u32::<LittleEndian>()?;
        header.pf.bmask = reader.read_u32::<LittleEndian>()?;
        header.pf.amask = reader.read_u32::<LittleEndian>()?;
        header.caps.caps1 = reader.read_u32::<LittleEndian>()?;
        header.caps.caps2 = reader.read_u32::<LittleEndian>()?;
        header.caps.caps3 = reader.read_u32::<LittleEndian>()?;
        header.caps.caps4 = reader.read_u32::<LittleEndian>()?;
        header.notused = reader.read_u32::<LittleEndian>()?;

        if header.pf.flags & DDPF_FOURCC != 0 && header.pf.fourcc == FOURCC_DX10 {
            header.header10 = Some(DdsHeader10 {
                dxgi_format: reader.read_u32::<LittleEndian>()?,
                resource_dimension: reader.read_u32::<LittleEndian>()?,
                misc_flag: reader.read_u32::<LittleEndian>()?,
                array_size: reader.read_u32::<LittleEndian>()?,
                misc_flags2: reader.read_u32::<LittleEndian>()?,
            });
        }
        Ok(header)
    }

    pub fn is_cubemap(&self) -> bool {
        self.caps.caps2 & DDSCAPS2_CUBEMAP != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> DdsHeader {
        let mut header = DdsHeader::new();
        header.set_width(256);
        header.set_height(128);
        header.set_mipmap_count(9);
        header.set_fourcc(b"DXT1");
        header.set_linear_size(8 * 64 * 32);
        header.set_texture_2d();
        header.set_normal_flag(true);
        header.set_swizzle_code(b"A2XY");
        header.set_user_version(7);
        header
    }

    #[test]
    fn legacy_header_is_128_bytes() {
        let header = sample_header();
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), DdsHeader::LEGACY_SIZE);
        assert_eq!(&bytes[0..4], b"DDS ");
        assert_eq!(&bytes[84..88], b"DXT1");
    }

    #[test]
    fn dx10_header_is_148_bytes() {
        let mut header = sample_header();
        header.set_dx10_format(70);
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), DdsHeader::DX10_SIZE);
        assert_eq!(&bytes[84..88], b"DX10");
    }

    #[test]
    fn header_round_trips_through_write_and_read() {
        let header = sample_header();
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        let read = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, header);
        assert!(read.has_normal_flag());
        assert_eq!(read.user_version(), Some(7));
    }

    #[test]
    fn dx10_header_round_trips() {
        let mut header = sample_header();
        header.set_dx10_format(76);
        header.set_texture_cube();
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        let read = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, header);
        assert!(read.is_cubemap());
    }

    #[test]
    fn pitch_and_linear_size_are_mutually_exclusive() {
        let mut header = DdsHeader::new();
        header.set_linear_size(1024);
        assert_ne!(header.flags & DDSD_LINEARSIZE, 0);
        header.set_pitch(512);
        assert_eq!(header.flags & DDSD_LINEARSIZE, 0);
        assert_ne!(header.flags & DDSD_PITCH, 0);
    }

    #[test]
    fn cube_caps_mark_all_faces() {
        let mut header = DdsHeader::new();
        header.set_texture_cube();
        assert_eq!(
            header.caps.caps2 & DDSCAPS2_CUBEMAP_ALL_FACES,
            DDSCAPS2_CUBEMAP_ALL_FACES
        );
    }
}
