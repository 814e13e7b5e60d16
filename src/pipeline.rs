//! The pipeline driver: accepts the three option records, applies color
//! transforms and mipmap generation, emits the DDS header, and drives the
//! tile dispatcher once per mip level per face.

use anyhow::{anyhow, Result};
use cgmath::{Matrix4, Vector4};

use crate::color::Color32;
use crate::compress::{rgb, BlockEncoder};
use crate::config::{
    AlphaMode, ColorTransform, CompressionOptions, Container, Format, InputOptions, InputPixels,
    InputSurface, MipmapFilter, PixelType, RoundMode, TextureType,
};
use crate::dds::DdsHeader;
use crate::dispatch::{self, ParallelDispatcher, TaskDispatcher};
use crate::error::{ErrorHandler, ErrorKind};
use crate::image::{
    binary_alpha, floyd_steinberg, floyd_steinberg_binary_alpha, BoxFilter, FloatImage, Image,
    KaiserFilter, TriangleFilter,
};
use crate::output::{FileOutputHandler, OutputHandler, OutputOptions};

/// The compression context. Owns the task dispatcher; everything else
/// arrives per call.
pub struct Context {
    dispatcher: Box<dyn TaskDispatcher + Send + Sync>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Output sink resolved for one `process` call, bundling the stream and
/// the error callback so failures are reported exactly once.
struct Emitter<'a> {
    sink: Sink<'a>,
    errors: Option<&'a mut Box<dyn ErrorHandler + Send>>,
}

enum Sink<'a> {
    Borrowed(&'a mut (dyn OutputHandler + Send)),
    File(FileOutputHandler),
}

impl Emitter<'_> {
    fn begin_image(&mut self, size: usize, w: u32, h: u32, d: u32, face: u32, mip: u32) {
        match &mut self.sink {
            Sink::Borrowed(handler) => handler.begin_image(size, w, h, d, face, mip),
            Sink::File(handler) => handler.begin_image(size, w, h, d, face, mip),
        }
    }

    fn write(&mut self, data: &[u8]) -> bool {
        let ok = match &mut self.sink {
            Sink::Borrowed(handler) => handler.write_data(data),
            Sink::File(handler) => handler.write_data(data),
        };
        if !ok {
            self.error(ErrorKind::FileWrite);
        }
        ok
    }

    fn error(&mut self, kind: ErrorKind) {
        log::error!("compression failed: {}", kind);
        if let Some(handler) = &mut self.errors {
            handler.error(kind);
        }
    }
}

fn previous_power_of_two(x: u32) -> u32 {
    if x <= 1 {
        1
    } else {
        1 << (31 - x.leading_zeros())
    }
}

fn round_extent(x: u32, mode: RoundMode) -> u32 {
    let x = x.max(1);
    match mode {
        RoundMode::None => x,
        RoundMode::ToNextPowerOfTwo => x.next_power_of_two(),
        RoundMode::ToPreviousPowerOfTwo => previous_power_of_two(x),
        RoundMode::ToNearestPowerOfTwo => {
            let next = x.next_power_of_two();
            let prev = previous_power_of_two(x);
            if next - x < x - prev {
                next
            } else {
                prev
            }
        }
    }
}

fn count_mipmaps(w: u32, h: u32, d: u32) -> u32 {
    let mut max = w.max(h).max(d).max(1);
    let mut count = 1;
    while max > 1 {
        max /= 2;
        count += 1;
    }
    count
}

/// Bytes per 4x4 block, or `None` for the uncompressed formats.
fn format_block_size(format: Format) -> Option<usize> {
    match format {
        Format::Bc1 | Format::Bc1a | Format::Bc1n | Format::Bc4 | Format::Ctx1 => Some(8),
        Format::Bc2 | Format::Bc3 | Format::Bc3n | Format::Bc5 => Some(16),
        Format::Rgba | Format::Rgbe => None,
    }
}

fn compute_image_size(w: u32, h: u32, d: u32, options: &CompressionOptions) -> usize {
    match format_block_size(options.format) {
        Some(block_size) => {
            (((w + 3) / 4) * ((h + 3) / 4)) as usize * block_size * d.max(1) as usize
        }
        None => {
            let bits = if options.format == Format::Rgbe { 32 } else { options.bit_count() };
            let pitch = rgb::compute_pitch(w, bits, options.pitch_alignment);
            (d.max(1) * h * pitch) as usize
        }
    }
}

impl Context {
    pub fn new() -> Self {
        Self { dispatcher: Box::new(ParallelDispatcher::new()) }
    }

    /// Replace the worker-pool dispatcher, e.g. with
    /// [`SequentialDispatcher`](crate::dispatch::SequentialDispatcher) or an
    /// embedder-supplied implementation.
    pub fn set_task_dispatcher(&mut self, dispatcher: Box<dyn TaskDispatcher + Send + Sync>) {
        self.dispatcher = dispatcher;
    }

    /// Compress the input texture with the given options. Errors are also
    /// reported to the error handler with their specific kind.
    pub fn process(
        &self,
        input: &InputOptions,
        compression: &CompressionOptions,
        output: &mut OutputOptions,
    ) -> Result<()> {
        let container = output.container;
        let output_header = output.output_header;
        let user_version = output.user_version;
        let srgb_flag = output.srgb_flag;

        let OutputOptions { file_name, output_handler, error_handler, .. } = output;

        let sink = match output_handler {
            Some(handler) => Sink::Borrowed(handler.as_mut()),
            None => {
                let path = match file_name {
                    Some(path) => path,
                    None => {
                        report(error_handler, ErrorKind::FileOpen);
                        return Err(anyhow!(ErrorKind::FileOpen));
                    }
                };
                match FileOutputHandler::create(path) {
                    Ok(handler) => Sink::File(handler),
                    Err(err) => {
                        report(error_handler, ErrorKind::FileOpen);
                        return Err(err.context(ErrorKind::FileOpen));
                    }
                }
            }
        };
        let mut emitter = Emitter { sink, errors: error_handler.as_mut() };

        let (w, h, d) = compute_target_extents(input);
        if input.face_count == 0 {
            emitter.error(ErrorKind::InvalidInput);
            return Err(anyhow!(ErrorKind::InvalidInput));
        }

        let mipmap_count = real_mipmap_count(input, w, h, d);
        log::info!(
            "compressing {}x{} texture: {} face(s), {} mip level(s), {:?}",
            w,
            h,
            input.face_count,
            mipmap_count,
            compression.format
        );

        if output_header {
            let header = match build_header(
                input,
                compression,
                container,
                user_version,
                srgb_flag,
                w,
                h,
                d,
                mipmap_count,
            ) {
                Some(header) => header,
                None => {
                    emitter.error(ErrorKind::UnsupportedOutputFormat);
                    return Err(anyhow!(ErrorKind::UnsupportedOutputFormat));
                }
            };

            let mut bytes = Vec::with_capacity(header.byte_size());
            header.write_to(&mut bytes)?;
            if !emitter.write(&bytes) {
                return Err(anyhow!(ErrorKind::FileWrite));
            }
        }

        for face in 0..input.face_count {
            self.compress_mipmaps(face, w, h, d, mipmap_count, input, compression, &mut emitter)?;
        }

        let flushed = match &mut emitter.sink {
            Sink::File(handler) => handler.flush().is_ok(),
            Sink::Borrowed(_) => true,
        };
        if !flushed {
            emitter.error(ErrorKind::FileWrite);
            return Err(anyhow!(ErrorKind::FileWrite));
        }

        Ok(())
    }

    /// Size in bytes of the compressed output, header excluded.
    pub fn estimate_size(&self, input: &InputOptions, compression: &CompressionOptions) -> usize {
        let (tw, th, td) = compute_target_extents(input);
        if tw == 0 || th == 0 {
            return 0;
        }
        let mipmap_count = real_mipmap_count(input, tw, th, td);

        let mut total = 0;
        for _ in 0..input.face_count {
            let (mut w, mut h, mut d) = (tw, th, td);
            for _ in 0..mipmap_count {
                total += compute_image_size(w, h, d, compression);
                w = (w / 2).max(1);
                h = (h / 2).max(1);
                d = (d / 2).max(1);
            }
        }
        total
    }

    #[allow(clippy::too_many_arguments)]
    fn compress_mipmaps(
        &self,
        face: u32,
        top_w: u32,
        top_h: u32,
        top_d: u32,
        mipmap_count: u32,
        input: &InputOptions,
        compression: &CompressionOptions,
        emitter: &mut Emitter<'_>,
    ) -> Result<()> {
        if top_w == 0 || top_h == 0 {
            // Zero-area surface: success, with no block writes.
            log::debug!("face {}: zero-area surface, nothing to compress", face);
            return Ok(());
        }

        let (mut w, mut h, mut d) = (top_w, top_h, top_d);
        let mut previous: Option<FloatImage> = None;

        for mip in 0..mipmap_count {
            let size = compute_image_size(w, h, d, compression);
            emitter.begin_image(size, w, h, d, face, mip);
            log::debug!("face {} mip {}: {}x{} ({} bytes)", face, mip, w, h, size);

            let mut level = match self.init_mipmap(&previous, input, face, mip, w, h, d) {
                Some(level) => level,
                None => {
                    emitter.error(ErrorKind::InvalidInput);
                    return Err(anyhow!(ErrorKind::InvalidInput));
                }
            };

            if (input.is_normal_map || input.convert_to_normal_map) && input.normalize_mipmaps {
                level.normalize_normals();
            }

            match input.color_transform {
                ColorTransform::Linear => apply_linear_transform(&mut level, &input.linear_transform),
                ColorTransform::Swizzle => apply_swizzle(&mut level, input.swizzle_transform),
                _ => {}
            }

            // The next level downsamples from the linear image, before any
            // gamma-space processing.
            previous = Some(level.clone());

            let mut fixed = if input.is_normal_map || input.output_gamma == 1.0 {
                level.to_image()
            } else {
                level.to_image_gamma_correct(input.output_gamma)
            };

            if matches!(input.color_transform, ColorTransform::YCoCg | ColorTransform::ScaledYCoCg) {
                rgb_to_ycocg_r(&mut fixed);
            }

            if input.premultiply_alpha {
                premultiply_alpha(&mut fixed);
            }

            quantize_mipmap(&mut fixed, compression);

            self.compress_2d(&fixed, &level, input.alpha_mode, compression, emitter)?;

            w = (w / 2).max(1);
            h = (h / 2).max(1);
            d = (d / 2).max(1);
        }

        Ok(())
    }

    /// Materialize one mip level in linear space: an exact input surface
    /// when present, a downsample of the previous level otherwise, or a
    /// rescale of the closest input as a last resort.
    #[allow(clippy::too_many_arguments)]
    fn init_mipmap(
        &self,
        previous: &Option<FloatImage>,
        input: &InputOptions,
        face: u32,
        mip: u32,
        w: u32,
        h: u32,
        d: u32,
    ) -> Option<FloatImage> {
        if let Some(surface) = find_exact_mipmap(input, face, w, h, d) {
            return Some(to_linear_float(surface, input));
        }

        if let Some(previous) = previous {
            if mip > 0 {
                return Some(downsample_level(previous, input));
            }
        }

        let closest = find_closest_mipmap(input, face)?;
        let float = to_linear_float(closest, input);
        if float.width() == w && float.height() == h {
            return Some(float);
        }

        log::debug!(
            "scaling input surface {}x{} to {}x{}",
            float.width(),
            float.height(),
            w,
            h
        );
        let filter = BoxFilter::new();
        if input.alpha_mode == AlphaMode::Transparency {
            Some(float.resize_alpha_weighted(&filter, w, h, input.wrap_mode))
        } else {
            Some(float.resize(&filter, w, h, input.wrap_mode))
        }
    }

    fn compress_2d(
        &self,
        fixed: &Image,
        float: &FloatImage,
        alpha_mode: AlphaMode,
        compression: &CompressionOptions,
        emitter: &mut Emitter<'_>,
    ) -> Result<()> {
        match compression.format {
            Format::Rgba => {
                let bytes = if compression.pixel_type == PixelType::Float {
                    match rgb::convert_to_float_rgba(float, compression) {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            emitter.error(ErrorKind::UnsupportedOutputFormat);
                            return Err(err.context(ErrorKind::UnsupportedOutputFormat));
                        }
                    }
                } else {
                    match rgb::convert_to_masked_rgba(fixed, compression) {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            emitter.error(ErrorKind::UnsupportedOutputFormat);
                            return Err(err.context(ErrorKind::UnsupportedOutputFormat));
                        }
                    }
                };
                if !emitter.write(&bytes) {
                    return Err(anyhow!(ErrorKind::FileWrite));
                }
            }
            Format::Rgbe => {
                let bytes = rgb::convert_to_rgbe(float);
                if !emitter.write(&bytes) {
                    return Err(anyhow!(ErrorKind::FileWrite));
                }
            }
            Format::Bc1n | Format::Ctx1 => {
                emitter.error(ErrorKind::UnsupportedFeature);
                return Err(anyhow!(ErrorKind::UnsupportedFeature));
            }
            _ => {
                let encoder = BlockEncoder::for_format(compression.format)
                    .expect("block formats are covered above");
                let bytes = dispatch::compress_surface(
                    encoder,
                    fixed,
                    alpha_mode,
                    compression,
                    self.dispatcher.as_ref(),
                );
                if !emitter.write(&bytes) {
                    return Err(anyhow!(ErrorKind::FileWrite));
                }
            }
        }
        Ok(())
    }
}

fn report(errors: &mut Option<Box<dyn ErrorHandler + Send>>, kind: ErrorKind) {
    log::error!("compression failed: {}", kind);
    if let Some(handler) = errors {
        handler.error(kind);
    }
}

fn compute_target_extents(input: &InputOptions) -> (u32, u32, u32) {
    let (mut w, mut h, mut d) = (input.width, input.height, input.depth.max(1));
    if w == 0 || h == 0 {
        return (w, h, d);
    }

    if input.max_extent > 0 {
        while w.max(h).max(d) > input.max_extent {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            d = (d / 2).max(1);
        }
    }

    (
        round_extent(w, input.round_mode),
        round_extent(h, input.round_mode),
        round_extent(d, input.round_mode),
    )
}

fn real_mipmap_count(input: &InputOptions, w: u32, h: u32, d: u32) -> u32 {
    if !input.generate_mipmaps {
        return 1;
    }
    let natural = count_mipmaps(w, h, d);
    if input.max_level >= 0 {
        natural.min(input.max_level as u32 + 1)
    } else {
        natural
    }
}

fn find_exact_mipmap<'a>(
    input: &'a InputOptions,
    face: u32,
    w: u32,
    h: u32,
    d: u32,
) -> Option<&'a InputSurface> {
    for mip in 0..input.mipmap_slots {
        if let Some(surface) = input.surface(face, mip) {
            if surface.width == w && surface.height == h && surface.depth == d {
                return Some(surface);
            }
            if surface.width < w || surface.height < h {
                return None;
            }
        }
    }
    None
}

fn find_closest_mipmap<'a>(input: &'a InputOptions, face: u32) -> Option<&'a InputSurface> {
    for mip in 0..input.mipmap_slots {
        if let Some(surface) = input.surface(face, mip) {
            return Some(surface);
        }
    }
    None
}

/// Convert an input surface to the linear-space float representation.
fn to_linear_float(surface: &InputSurface, input: &InputOptions) -> FloatImage {
    match &surface.pixels {
        InputPixels::Fixed(image) => {
            let mut float = FloatImage::from_image(image);
            if !input.is_normal_map && input.input_gamma != 1.0 {
                float.to_linear(input.input_gamma);
            }
            float
        }
        InputPixels::Float(float) => float.clone(),
    }
}

fn downsample_level(previous: &FloatImage, input: &InputOptions) -> FloatImage {
    let alpha_weighted = input.alpha_mode == AlphaMode::Transparency;

    match input.mipmap_filter {
        MipmapFilter::Box if !alpha_weighted => previous.fast_down_sample(),
        MipmapFilter::Box => previous.down_sample_alpha_weighted(&BoxFilter::new(), input.wrap_mode),
        MipmapFilter::Triangle => {
            let filter = TriangleFilter::new();
            if alpha_weighted {
                previous.down_sample_alpha_weighted(&filter, input.wrap_mode)
            } else {
                previous.down_sample(&filter, input.wrap_mode)
            }
        }
        MipmapFilter::Kaiser => {
            let mut filter = KaiserFilter::new(input.kaiser_width);
            filter.set_parameters(input.kaiser_alpha, input.kaiser_stretch);
            if alpha_weighted {
                previous.down_sample_alpha_weighted(&filter, input.wrap_mode)
            } else {
                previous.down_sample(&filter, input.wrap_mode)
            }
        }
    }
}

fn apply_linear_transform(level: &mut FloatImage, matrix: &Matrix4<f32>) {
    let count = (level.width() * level.height()) as usize;
    let channels = level.channel_count().min(4);
    for i in 0..count {
        let mut v = Vector4::new(0.0, 0.0, 0.0, 1.0);
        for c in 0..channels {
            v[c as usize] = level.pixel_index(c, i);
        }
        let out = matrix * v;
        for c in 0..channels {
            level.set_pixel_index(c, i, out[c as usize]);
        }
    }
}

fn apply_swizzle(level: &mut FloatImage, swizzle: [usize; 4]) {
    let count = (level.width() * level.height()) as usize;
    let channels = level.channel_count().min(4) as usize;
    for i in 0..count {
        let mut source = [0.0f32; 4];
        source[3] = 1.0;
        for (c, v) in source.iter_mut().enumerate().take(channels) {
            *v = level.pixel_index(c as u32, i);
        }
        for c in 0..channels {
            level.set_pixel_index(c as u32, i, source[swizzle[c]]);
        }
    }
}

/// The reversible-lifting YCoCg transform, biased into the byte range with
/// luma in alpha so DXT5 keeps it at full precision.
fn rgb_to_ycocg_r(image: &mut Image) {
    for pixel in image.pixels_mut() {
        let r = pixel.r as i32;
        let g = pixel.g as i32;
        let b = pixel.b as i32;

        let co = r - b;
        let t = b + (co >> 1);
        let cg = g - t;
        let y = t + (cg >> 1);

        *pixel = Color32::new(
            ((co >> 1) + 128).clamp(0, 255) as u8,
            ((cg >> 1) + 128).clamp(0, 255) as u8,
            0,
            y.clamp(0, 255) as u8,
        );
    }
}

fn premultiply_alpha(image: &mut Image) {
    for pixel in image.pixels_mut() {
        pixel.r = ((pixel.r as u32 * pixel.a as u32) >> 8) as u8;
        pixel.g = ((pixel.g as u32 * pixel.a as u32) >> 8) as u8;
        pixel.b = ((pixel.b as u32 * pixel.a as u32) >> 8) as u8;
    }
}

fn quantize_mipmap(image: &mut Image, options: &CompressionOptions) {
    if options.binary_alpha {
        if options.alpha_dithering {
            floyd_steinberg_binary_alpha(image, options.alpha_threshold);
        } else {
            binary_alpha(image, options.alpha_threshold);
        }
    }

    if options.color_dithering || options.alpha_dithering {
        let mut rsize = 8;
        let mut gsize = 8;
        let mut bsize = 8;
        let mut asize = 8;

        if options.color_dithering {
            match options.format {
                Format::Bc1 | Format::Bc1a | Format::Bc2 | Format::Bc3 | Format::Bc3n => {
                    rsize = 5;
                    gsize = 6;
                    bsize = 5;
                }
                Format::Rgba => {
                    rsize = options.rmask.count_ones();
                    gsize = options.gmask.count_ones();
                    bsize = options.bmask.count_ones();
                }
                _ => {}
            }
        }

        if options.alpha_dithering {
            if options.format == Format::Bc2 {
                asize = 4;
            } else if options.format == Format::Rgba {
                asize = options.amask.count_ones();
            }
        }

        if options.binary_alpha {
            // Alpha was already quantized above.
            asize = 8;
        }

        floyd_steinberg(image, rsize, gsize, bsize, asize);
    }
}

/// Build the container header, or `None` when the container cannot express
/// the format.
#[allow(clippy::too_many_arguments)]
fn build_header(
    input: &InputOptions,
    compression: &CompressionOptions,
    container: Container,
    user_version: Option<u32>,
    srgb_flag: bool,
    w: u32,
    h: u32,
    d: u32,
    mipmap_count: u32,
) -> Option<DdsHeader> {
    let mut header = DdsHeader::new();
    header.set_width(w);
    header.set_height(h);
    header.set_mipmap_count(mipmap_count);
    if d > 1 {
        header.set_depth(d);
    }

    match container {
        Container::Dds10 => {
            let dxgi = match compression.format {
                Format::Rgba => {
                    if compression.bit_count() == 16 && compression.rsize == 16 {
                        56 // DXGI_FORMAT_R16_UNORM
                    } else {
                        return None;
                    }
                }
                Format::Bc1 | Format::Bc1a | Format::Bc1n => 70, // DXGI_FORMAT_BC1_TYPELESS
                Format::Bc2 => 73,                               // DXGI_FORMAT_BC2_TYPELESS
                Format::Bc3 | Format::Bc3n => 76,                // DXGI_FORMAT_BC3_TYPELESS
                Format::Bc4 => 79,                               // DXGI_FORMAT_BC4_TYPELESS
                Format::Bc5 => 82,                               // DXGI_FORMAT_BC5_TYPELESS
                Format::Ctx1 | Format::Rgbe => return None,
            };
            header.set_dx10_format(dxgi);
            if compression.format == Format::Bc1a {
                header.set_has_alpha_flag(true);
            }
            if input.is_normal_map {
                header.set_normal_flag(true);
            }
        }
        Container::Dds => match compression.format {
            Format::Rgba => {
                header.set_pitch(rgb::compute_pitch(
                    w,
                    compression.bit_count(),
                    compression.pitch_alignment,
                ));
                if compression.pixel_type == PixelType::Float {
                    let code = match (
                        compression.rsize,
                        compression.gsize,
                        compression.bsize,
                        compression.asize,
                    ) {
                        (16, 0, 0, 0) => 111,     // D3DFMT_R16F
                        (16, 16, 0, 0) => 112,    // D3DFMT_G16R16F
                        (16, 16, 16, 16) => 113,  // D3DFMT_A16B16G16R16F
                        (32, 0, 0, 0) => 114,     // D3DFMT_R32F
                        (32, 32, 0, 0) => 115,    // D3DFMT_G32R32F
                        (32, 32, 32, 32) => 116,  // D3DFMT_A32B32G32R32F
                        _ => return None,
                    };
                    header.set_format_code(code);
                } else {
                    let bitcount = compression.bit_count();
                    if bitcount == 0 || bitcount > 32 {
                        return None;
                    }
                    header.set_pixel_format(
                        bitcount,
                        compression.rmask,
                        compression.gmask,
                        compression.bmask,
                        compression.amask,
                    );
                }
            }
            Format::Rgbe => {
                header.set_pitch(rgb::compute_pitch(w, 32, compression.pitch_alignment));
                header.set_pixel_format(32, 0x0000_00ff, 0x0000_ff00, 0x00ff_0000, 0xff00_0000);
            }
            _ => {
                header.set_linear_size(compute_image_size(w, h, d, compression) as u32);
                match compression.format {
                    Format::Bc1 | Format::Bc1a | Format::Bc1n => {
                        header.set_fourcc(b"DXT1");
                        if input.is_normal_map {
                            header.set_normal_flag(true);
                        }
                    }
                    Format::Bc2 => header.set_fourcc(b"DXT3"),
                    Format::Bc3 => header.set_fourcc(b"DXT5"),
                    Format::Bc3n => {
                        header.set_fourcc(b"DXT5");
                        if input.is_normal_map {
                            header.set_normal_flag(true);
                            header.set_swizzle_code(b"A2D5");
                        }
                    }
                    Format::Bc4 => header.set_fourcc(b"ATI1"),
                    Format::Bc5 => {
                        header.set_fourcc(b"ATI2");
                        if input.is_normal_map {
                            header.set_normal_flag(true);
                            header.set_swizzle_code(b"A2XY");
                        }
                    }
                    Format::Ctx1 => {
                        header.set_fourcc(b"CTX1");
                        if input.is_normal_map {
                            header.set_normal_flag(true);
                        }
                    }
                    Format::Rgba | Format::Rgbe => return None,
                }
            }
        },
    }

    if let Some(version) = user_version {
        header.set_user_version(version);
    }
    if srgb_flag {
        header.set_srgb_flag(true);
    }

    match input.texture_type {
        TextureType::D2 => header.set_texture_2d(),
        TextureType::Cube => header.set_texture_cube(),
    }

    Some(header)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::{InputFormat, Quality};
    use crate::dds::{FOURCC_ATI1, FOURCC_DXT1, FOURCC_DXT5};
    use crate::dispatch::SequentialDispatcher;
    use crate::output::MemoryOutputHandler;

    struct ErrorCollector(Arc<Mutex<Vec<ErrorKind>>>);

    impl ErrorHandler for ErrorCollector {
        fn error(&mut self, kind: ErrorKind) {
            self.0.lock().unwrap().push(kind);
        }
    }

    fn solid_bgra(w: u32, h: u32, b: u8, g: u8, r: u8, a: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for _ in 0..w * h {
            data.extend_from_slice(&[b, g, r, a]);
        }
        data
    }

    fn run(
        input: &InputOptions,
        compression: &CompressionOptions,
    ) -> (Result<()>, Vec<u8>, Vec<ErrorKind>) {
        let handler = MemoryOutputHandler::new();
        let errors = Arc::new(Mutex::new(Vec::new()));

        let mut output = OutputOptions::new();
        output.set_output_handler(Box::new(handler.clone()));
        output.set_error_handler(Box::new(ErrorCollector(errors.clone())));

        let context = Context::new();
        let result = context.process(input, compression, &mut output);
        let collected = errors.lock().unwrap().clone();
        (result, handler.bytes(), collected)
    }

    #[test]
    fn bc1_mip_chain_has_the_expected_length() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 16, 16, 1);
        input
            .set_mipmap_data(&solid_bgra(16, 16, 0, 0, 255, 255), 16, 16, 1, 0, 0)
            .unwrap();

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc1);
        compression.set_quality(Quality::Fastest);

        let (result, bytes, _) = run(&input, &compression);
        result.unwrap();

        // Mips 16, 8, 4, 2, 1 compress to 16, 4, 1, 1, 1 blocks.
        assert_eq!(bytes.len(), 128 + 8 * (16 + 4 + 1 + 1 + 1));

        let header = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.mipmapcount, 5);
        assert_eq!(header.width, 16);
        assert_eq!(header.pf.fourcc, FOURCC_DXT1);
        assert_eq!(header.pitch, 8 * 16);
    }

    #[test]
    fn cube_maps_emit_six_face_chains() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::Cube, 8, 8, 1);
        for face in 0..6u32 {
            input
                .set_mipmap_data(&solid_bgra(8, 8, (face * 30) as u8, 0, 0, 255), 8, 8, 1, face, 0)
                .unwrap();
        }
        input.set_mipmap_generation(false, -1);

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc1);
        compression.set_quality(Quality::Fastest);

        let (result, bytes, _) = run(&input, &compression);
        result.unwrap();

        // Six faces of 2x2 blocks, 8 bytes each, after the legacy header.
        assert_eq!(bytes.len(), 128 + 6 * 4 * 8);

        let header = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert!(header.is_cubemap());
        assert_eq!(header.mipmapcount, 1);

        // Face order follows the face index: the first face chain starts
        // right after the header and encodes that face's color.
        let first = crate::block::BlockDxt1::from_bytes(bytes[128..136].try_into().unwrap());
        let palette = first.evaluate_palette();
        assert_eq!(palette[first.index(0)].b, 0);
    }

    #[test]
    fn estimate_size_matches_emitted_bytes() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 20, 12, 1);
        input
            .set_mipmap_data(&solid_bgra(20, 12, 1, 2, 3, 255), 20, 12, 1, 0, 0)
            .unwrap();

        for format in [Format::Bc1, Format::Bc3, Format::Bc4, Format::Rgba] {
            let mut compression = CompressionOptions::new();
            compression.set_format(format);
            compression.set_quality(Quality::Fastest);

            let (result, bytes, _) = run(&input, &compression);
            result.unwrap();

            let context = Context::new();
            let estimated = context.estimate_size(&input, &compression);
            assert_eq!(bytes.len() - 128, estimated, "{:?}", format);
        }
    }

    #[test]
    fn missing_sink_reports_file_open() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 4, 4, 1);
        input
            .set_mipmap_data(&solid_bgra(4, 4, 0, 0, 0, 255), 4, 4, 1, 0, 0)
            .unwrap();

        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut output = OutputOptions::new();
        output.set_error_handler(Box::new(ErrorCollector(errors.clone())));

        let result = Context::new().process(&input, &CompressionOptions::new(), &mut output);
        assert!(result.is_err());
        assert_eq!(errors.lock().unwrap().as_slice(), &[ErrorKind::FileOpen]);
    }

    #[test]
    fn reserved_format_aborts_after_the_header() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 4, 4, 1);
        input
            .set_mipmap_data(&solid_bgra(4, 4, 0, 0, 0, 255), 4, 4, 1, 0, 0)
            .unwrap();
        input.set_mipmap_generation(false, -1);

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Ctx1);

        let (result, bytes, errors) = run(&input, &compression);
        assert!(result.is_err());
        assert_eq!(errors, vec![ErrorKind::UnsupportedFeature]);
        // The header was already out when the missing encoder was hit.
        assert_eq!(bytes.len(), 128);
    }

    #[test]
    fn zero_area_input_succeeds_with_no_block_writes() {
        // Untouched defaults declare a 0x0 texture with no surfaces.
        let input = InputOptions::new();

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc1);

        let (result, bytes, errors) = run(&input, &compression);
        result.unwrap();
        assert!(errors.is_empty());
        // Only the header goes out.
        assert_eq!(bytes.len(), 128);

        let header = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!((header.width, header.height), (0, 0));
    }

    #[test]
    fn missing_input_surface_is_invalid_input() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 8, 8, 1);
        // No mipmap data set at all.

        let (result, _, errors) = run(&input, &CompressionOptions::new());
        assert!(result.is_err());
        assert!(errors.contains(&ErrorKind::InvalidInput));
    }

    #[test]
    fn sequential_and_parallel_pipelines_agree() {
        let mut data = Vec::new();
        let mut state = 42u32;
        for _ in 0..64 * 64 {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            data.extend_from_slice(&state.to_le_bytes());
        }

        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 64, 64, 1);
        input.set_mipmap_data(&data, 64, 64, 1, 0, 0).unwrap();

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc3);
        compression.set_quality(Quality::Normal);

        let (_, parallel_bytes, _) = run(&input, &compression);

        let handler = MemoryOutputHandler::new();
        let mut output = OutputOptions::new();
        output.set_output_handler(Box::new(handler.clone()));
        let mut context = Context::new();
        context.set_task_dispatcher(Box::new(SequentialDispatcher));
        context.process(&input, &compression, &mut output).unwrap();

        assert_eq!(parallel_bytes, handler.bytes());
    }

    #[test]
    fn max_extent_halves_the_input() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 16, 8, 1);
        input
            .set_mipmap_data(&solid_bgra(16, 8, 9, 9, 9, 255), 16, 8, 1, 0, 0)
            .unwrap();
        input.set_max_extents(8);
        input.set_mipmap_generation(false, -1);

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc1);
        compression.set_quality(Quality::Fastest);

        let (result, bytes, _) = run(&input, &compression);
        result.unwrap();

        let header = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!((header.width, header.height), (8, 4));
        // 2x1 blocks of 8 bytes.
        assert_eq!(bytes.len(), 128 + 16);
    }

    #[test]
    fn mip_cap_limits_the_chain() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 16, 16, 1);
        input
            .set_mipmap_data(&solid_bgra(16, 16, 4, 4, 4, 255), 16, 16, 1, 0, 0)
            .unwrap();
        input.set_mipmap_generation(true, 2);

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc4);
        compression.set_quality(Quality::Fastest);

        let (result, bytes, _) = run(&input, &compression);
        result.unwrap();

        let header = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.mipmapcount, 3);
        assert_eq!(header.pf.fourcc, FOURCC_ATI1);
        // 16, 4, and 1 blocks of 8 bytes.
        assert_eq!(bytes.len(), 128 + 8 * (16 + 4 + 1));
    }

    #[test]
    fn normal_map_bc3n_header_carries_the_swizzle_code() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 8, 8, 1);
        input
            .set_mipmap_data(&solid_bgra(8, 8, 255, 128, 128, 255), 8, 8, 1, 0, 0)
            .unwrap();
        input.set_normal_map(true);
        input.set_mipmap_generation(false, -1);

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc3n);
        compression.set_quality(Quality::Fastest);

        let (result, bytes, _) = run(&input, &compression);
        result.unwrap();

        let header = DdsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.pf.fourcc, FOURCC_DXT5);
        assert!(header.has_normal_flag());
        assert_eq!(header.reserved[4], crate::dds::make_fourcc(b"A2D5"));
    }

    #[test]
    fn rgbe_output_writes_shared_exponent_pixels() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 2, 2, 1);
        input.set_format(InputFormat::Rgba32f);
        let mut data = Vec::new();
        for _ in 0..4 {
            for value in [1.0f32, 0.0, 0.0, 1.0] {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }
        input.set_mipmap_data(&data, 2, 2, 1, 0, 0).unwrap();
        input.set_mipmap_generation(false, -1);
        input.set_gamma(1.0, 1.0);

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Rgbe);

        let (result, bytes, _) = run(&input, &compression);
        result.unwrap();
        assert_eq!(bytes.len(), 128 + 4 * 4);
        assert_eq!(&bytes[128..132], &[128, 0, 0, 129]);
    }

    #[test]
    fn binary_alpha_quantization_reaches_the_encoder() {
        let mut input = InputOptions::new();
        input.set_texture_layout(TextureType::D2, 4, 4, 1);
        input
            .set_mipmap_data(&solid_bgra(4, 4, 10, 10, 10, 100), 4, 4, 1, 0, 0)
            .unwrap();
        input.set_mipmap_generation(false, -1);

        let mut compression = CompressionOptions::new();
        compression.set_format(Format::Bc1a);
        compression.set_quality(Quality::Normal);
        compression.set_quantization(false, false, true, 127);

        let (result, bytes, _) = run(&input, &compression);
        result.unwrap();

        // Alpha 100 thresholds to 0, so every texel is punch-through.
        let block = crate::block::BlockDxt1::from_bytes(bytes[128..136].try_into().unwrap());
        assert!(!block.is_four_color_mode());
        for i in 0..16 {
            assert_eq!(block.index(i), 3);
        }
    }
}

