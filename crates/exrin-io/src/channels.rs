//! Canonical channel ordering.
//!
//! Files list channels in whatever order the writer chose (usually sorted
//! by name, which puts `A` before `B`). Callers expect the conventional
//! presentation `R, G, B, A, Z` within each layer, so [`ChannelCatalog`]
//! reorders the on-disk list:
//!
//! 1. Split every name at its last `.` into layer (`"diffuse."`) and suffix (`"R"`).
//! 2. Stable-sort by layer, keeping the on-disk order of equal layers.
//! 3. Rank each suffix inside its layer with a table of well-known names.
//!    A layer holding `X` plus `Y` or `Z` is treated as a vector and uses
//!    the table with `X, Y, Z` after the colour names.
//! 4. Stable-sort each layer by (rank, suffix).
//!
//! # Example
//!
//! ```rust
//! use exrin_core::DataFormat;
//! use exrin_io::channels::ChannelCatalog;
//! use exrin_io::codec::RawChannel;
//!
//! let raw: Vec<_> = ["A", "B", "G", "R"]
//!     .iter()
//!     .map(|n| RawChannel::new(*n, DataFormat::F16))
//!     .collect();
//! let catalog = ChannelCatalog::build(&raw).unwrap();
//! assert_eq!(catalog.names().collect::<Vec<_>>(), ["R", "G", "B", "A"]);
//! assert_eq!(catalog.alpha_channel(), Some(3));
//! ```

use crate::codec::RawChannel;
use crate::error::{IoError, IoResult, SubsampledChannel};
use exrin_core::{DataFormat, ImageSpec};

/// Rank given to suffixes missing from the ordering tables.
pub const UNRANKED: usize = 10000;

const STANDARD_ORDER: [&str; 20] = [
    "R", "Red", "G", "Green", "B", "Blue", "Y", "real", "imag", "A", "Alpha", "AR", "RA", "AG", "GA",
    "AB", "BA", "Z", "Depth", "Zback",
];

const VECTOR_ORDER: [&str; 21] = [
    "R", "Red", "G", "Green", "B", "Blue", "X", "Y", "Z", "real", "imag", "A", "Alpha", "AR", "RA",
    "AG", "GA", "AB", "BA", "Depth", "Zback",
];

fn rank(suffix: &str, table: &[&str]) -> usize {
    table
        .iter()
        .position(|name| name.eq_ignore_ascii_case(suffix))
        .unwrap_or(UNRANKED)
}

/// One channel in presentation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    full_name: String,
    layer_len: usize,
    /// Position in the on-disk channel list.
    pub source_index: usize,
    /// Rank from the ordering table, [`UNRANKED`] if none matched.
    pub special_index: usize,
    /// Sample type.
    pub format: DataFormat,
    /// Horizontal sampling rate.
    pub x_sampling: i32,
    /// Vertical sampling rate.
    pub y_sampling: i32,
}

impl ChannelInfo {
    fn from_raw(source_index: usize, raw: &RawChannel) -> Self {
        let layer_len = raw.name.rfind('.').map_or(0, |dot| dot + 1);
        Self {
            full_name: raw.name.clone(),
            layer_len,
            source_index,
            special_index: UNRANKED,
            format: raw.format,
            x_sampling: raw.x_sampling,
            y_sampling: raw.y_sampling,
        }
    }

    /// Full name, `layer + suffix`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Prefix up to and including the last `.`, empty if none.
    pub fn layer(&self) -> &str {
        &self.full_name[..self.layer_len]
    }

    /// Name after the layer prefix.
    pub fn suffix(&self) -> &str {
        &self.full_name[self.layer_len..]
    }

    fn suffix_is(&self, names: &[&str]) -> bool {
        names.iter().any(|n| n.eq_ignore_ascii_case(self.suffix()))
    }
}

/// Channels of one part in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCatalog {
    channels: Vec<ChannelInfo>,
    alpha: Option<usize>,
    depth: Option<usize>,
}

impl ChannelCatalog {
    /// Orders `raw` (on-disk order) into presentation order.
    ///
    /// Fails with [`IoError::UnsupportedSubsampling`] listing every channel
    /// whose sampling is not 1x1, and with [`IoError::Header`] when the
    /// list is empty.
    pub fn build(raw: &[RawChannel]) -> IoResult<Self> {
        if raw.is_empty() {
            return Err(IoError::Header("No channels found".into()));
        }

        let mut channels: Vec<ChannelInfo> = raw
            .iter()
            .enumerate()
            .map(|(i, c)| ChannelInfo::from_raw(i, c))
            .collect();

        channels.sort_by(|a, b| a.layer().cmp(b.layer()));

        for layer in channels.chunk_by_mut(|a, b| a.layer() == b.layer()) {
            let has = |name: &str| layer.iter().any(|c| c.suffix().eq_ignore_ascii_case(name));
            let table: &[&str] = if has("X") && (has("Y") || has("Z")) {
                &VECTOR_ORDER
            } else {
                &STANDARD_ORDER
            };
            for ch in layer.iter_mut() {
                ch.special_index = rank(ch.suffix(), table);
            }
            layer.sort_by(|a, b| {
                a.special_index
                    .cmp(&b.special_index)
                    .then_with(|| a.suffix().cmp(b.suffix()))
            });
        }

        let alpha = channels.iter().position(|c| c.suffix_is(&["A", "Alpha"]));
        let depth = channels.iter().position(|c| c.suffix_is(&["Z", "Depth"]));

        let subsampled: Vec<SubsampledChannel> = channels
            .iter()
            .filter(|c| c.x_sampling != 1 || c.y_sampling != 1)
            .map(|c| SubsampledChannel {
                name: c.full_name.clone(),
                x_sampling: c.x_sampling,
                y_sampling: c.y_sampling,
            })
            .collect();
        if !subsampled.is_empty() {
            return Err(IoError::UnsupportedSubsampling(subsampled));
        }

        Ok(Self {
            channels,
            alpha,
            depth,
        })
    }

    /// Channels in presentation order.
    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always `false` for a built catalog.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Index of the first `A`/`Alpha` channel.
    pub fn alpha_channel(&self) -> Option<usize> {
        self.alpha
    }

    /// Index of the first `Z`/`Depth` channel.
    pub fn depth_channel(&self) -> Option<usize> {
        self.depth
    }

    /// Full names in presentation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(ChannelInfo::full_name)
    }

    /// The shared sample type, `None` when channels differ.
    pub fn uniform_format(&self) -> Option<DataFormat> {
        let first = self.channels.first()?.format;
        self.channels.iter().all(|c| c.format == first).then_some(first)
    }

    /// Writes names, formats, alpha and depth indices into `spec`.
    pub fn apply_to(&self, spec: &mut ImageSpec) {
        spec.channel_names = self.names().map(str::to_string).collect();
        spec.format = self
            .channels
            .iter()
            .map(|c| c.format)
            .reduce(DataFormat::merge)
            .unwrap_or_default();
        spec.channel_formats = match self.uniform_format() {
            Some(_) => Vec::new(),
            None => self.channels.iter().map(|c| c.format).collect(),
        };
        spec.alpha_channel = self.alpha;
        spec.z_channel = self.depth;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(names: &[&str]) -> Vec<RawChannel> {
        names.iter().map(|n| RawChannel::new(*n, DataFormat::F16)).collect()
    }

    fn order(names: &[&str]) -> Vec<String> {
        ChannelCatalog::build(&raw(names))
            .unwrap()
            .names()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_rgba_order() {
        assert_eq!(order(&["A", "B", "G", "R"]), ["R", "G", "B", "A"]);
        assert_eq!(order(&["Z", "A", "B", "G", "R"]), ["R", "G", "B", "A", "Z"]);
    }

    #[test]
    fn test_permutations_are_deterministic() {
        let names = ["diffuse.B", "Z", "N.Y", "A", "diffuse.R", "custom", "N.X", "R", "diffuse.G"];
        let expected = order(&names);

        let mut shuffled = names;
        for step in 0..names.len() {
            shuffled.rotate_left(1);
            shuffled.swap(0, step);
            assert_eq!(order(&shuffled), expected);
        }
        let mut reversed = names;
        reversed.reverse();
        assert_eq!(order(&reversed), expected);
    }

    #[test]
    fn test_layer_grouping() {
        let out = order(&["diffuse.R", "N.Y", "diffuse.G", "N.X", "diffuse.B", "N.Z"]);
        assert_eq!(out, ["N.X", "N.Y", "N.Z", "diffuse.R", "diffuse.G", "diffuse.B"]);
    }

    #[test]
    fn test_vector_table_only_for_xyz_layers() {
        // Y without X keeps luminance ranking: after B, before A
        assert_eq!(order(&["A", "Y", "B"]), ["B", "Y", "A"]);
        // X with Z switches to the vector table, Z moves before A
        assert_eq!(order(&["A", "Z", "X"]), ["X", "Z", "A"]);
    }

    #[test]
    fn test_case_insensitive_ranking() {
        assert_eq!(order(&["alpha", "blue", "red"]), ["red", "blue", "alpha"]);
    }

    #[test]
    fn test_unranked_sorted_by_suffix() {
        assert_eq!(order(&["zeta", "R", "beta"]), ["R", "beta", "zeta"]);
        let catalog = ChannelCatalog::build(&raw(&["zeta", "R"])).unwrap();
        assert_eq!(catalog.channels()[1].special_index, UNRANKED);
        assert_eq!(catalog.channels()[1].source_index, 0);
    }

    #[test]
    fn test_split_at_last_dot() {
        let catalog = ChannelCatalog::build(&raw(&["light.key.R", "plain"])).unwrap();
        let key = &catalog.channels()[1];
        assert_eq!(key.layer(), "light.key.");
        assert_eq!(key.suffix(), "R");
        let plain = &catalog.channels()[0];
        assert_eq!(plain.layer(), "");
        assert_eq!(plain.suffix(), "plain");
    }

    #[test]
    fn test_alpha_and_depth() {
        let catalog = ChannelCatalog::build(&raw(&["R", "G", "B", "A"])).unwrap();
        assert_eq!(catalog.alpha_channel(), Some(3));
        assert_eq!(catalog.depth_channel(), None);

        let catalog = ChannelCatalog::build(&raw(&["R", "G", "B"])).unwrap();
        assert_eq!(catalog.alpha_channel(), None);
        assert_eq!(catalog.depth_channel(), None);

        let catalog = ChannelCatalog::build(&raw(&["depth", "fg.Alpha", "bg.A"])).unwrap();
        // "" < "bg." < "fg."
        assert_eq!(catalog.depth_channel(), Some(0));
        assert_eq!(catalog.alpha_channel(), Some(1));
    }

    #[test]
    fn test_subsampled_channels_rejected() {
        let mut channels = raw(&["Y", "RY", "BY"]);
        channels[1].x_sampling = 2;
        channels[1].y_sampling = 2;
        channels[2].x_sampling = 2;

        match ChannelCatalog::build(&channels) {
            Err(IoError::UnsupportedSubsampling(bad)) => {
                let names: Vec<_> = bad.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, ["BY", "RY"]);
            }
            other => panic!("expected subsampling error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_list() {
        assert!(matches!(ChannelCatalog::build(&[]), Err(IoError::Header(_))));
    }

    #[test]
    fn test_apply_mixed_formats() {
        let mut channels = raw(&["R", "G", "Z"]);
        channels[2].format = DataFormat::F32;
        let catalog = ChannelCatalog::build(&channels).unwrap();
        let mut spec = ImageSpec::default();
        catalog.apply_to(&mut spec);
        assert_eq!(spec.format, DataFormat::F32);
        assert_eq!(spec.channel_formats, [DataFormat::F16, DataFormat::F16, DataFormat::F32]);
        assert_eq!(spec.z_channel, Some(2));

        let catalog = ChannelCatalog::build(&raw(&["R", "G"])).unwrap();
        catalog.apply_to(&mut spec);
        assert_eq!(spec.format, DataFormat::F16);
        assert!(spec.channel_formats.is_empty());
    }
}
