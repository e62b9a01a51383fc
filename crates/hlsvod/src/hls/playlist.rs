// Playlist resolution: master → media playlist → absolute segment list.

use std::sync::Arc;

use m3u8_rs::{KeyMethod, parse_playlist_res};
use tracing::{debug, info, warn};
use url::Url;

use crate::VodError;
use crate::hls::config::{PlaylistConfig, VariantSelectionPolicy};
use crate::hls::fetcher::{ByteRange, FetchedText, HttpTransport};

/// The job's input URL with its query parameters split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRef {
    pub url: Url,
    pub query: Vec<(String, String)>,
}

impl PlaylistRef {
    pub fn parse(input: &str) -> Result<Self, VodError> {
        let url = Url::parse(input.trim())
            .map_err(|e| VodError::InvalidInput(format!("'{input}' is not a valid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VodError::InvalidInput(format!(
                "unsupported URL scheme '{}' in {input}",
                url.scheme()
            )));
        }
        let query = url.query_pairs().into_owned().collect();
        Ok(Self { url, query })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantStream {
    /// As written in the master playlist, possibly relative
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: Option<(u64, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 0-based position in the media playlist; the only stable identity
    pub index: usize,
    pub url: Url,
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone)]
pub struct MediaPlaylist {
    pub base_url: Url,
    pub segments: Vec<Segment>,
    pub end_list: bool,
    pub encrypted: bool,
}

#[derive(Debug, Clone)]
pub enum ParsedPlaylist {
    Master(Vec<VariantStream>),
    Media(MediaPlaylist),
}

/// Parse playlist text fetched from `base_url`. Segment URIs come back absolute.
pub fn parse_playlist(text: &str, base_url: &Url) -> Result<ParsedPlaylist, VodError> {
    let text = text.trim_start_matches('\u{feff}');
    if !text.trim_start().starts_with("#EXTM3U") {
        return Err(VodError::Parse(format!(
            "{base_url} did not return an M3U8 playlist (missing #EXTM3U header)"
        )));
    }

    let playlist = parse_playlist_res(text.as_bytes())
        .map_err(|e| VodError::Parse(format!("failed to parse playlist from {base_url}: {e}")))?;

    match playlist {
        m3u8_rs::Playlist::MasterPlaylist(master) => {
            let variants = master
                .variants
                .into_iter()
                .filter(|v| !v.is_i_frame)
                .map(|v| VariantStream {
                    uri: v.uri,
                    bandwidth: v.bandwidth,
                    resolution: v.resolution.map(|r| (r.width, r.height)),
                })
                .collect();
            Ok(ParsedPlaylist::Master(variants))
        }
        m3u8_rs::Playlist::MediaPlaylist(media) => {
            let mut segments = Vec::with_capacity(media.segments.len());
            let mut encrypted = false;
            // (uri, end offset) of the last ranged segment, for implicit offsets
            let mut last_range: Option<(String, u64)> = None;

            for (index, segment) in media.segments.iter().enumerate() {
                let url = base_url.join(&segment.uri).map_err(|e| {
                    VodError::Parse(format!(
                        "segment URI '{}' cannot be resolved against {base_url}: {e}",
                        segment.uri
                    ))
                })?;

                if segment
                    .key
                    .as_ref()
                    .is_some_and(|key| !matches!(key.method, KeyMethod::None))
                {
                    encrypted = true;
                }

                let byte_range = match &segment.byte_range {
                    Some(range) if range.length == 0 => {
                        return Err(VodError::Parse(format!(
                            "segment {index} ('{}') has a zero-length byte range",
                            segment.uri
                        )));
                    }
                    Some(range) => {
                        let start = match (range.offset, &last_range) {
                            (Some(offset), _) => offset,
                            (None, Some((uri, end))) if *uri == segment.uri => *end,
                            (None, _) => 0,
                        };
                        last_range = Some((segment.uri.clone(), start + range.length));
                        Some(ByteRange {
                            start,
                            length: range.length,
                        })
                    }
                    None => None,
                };

                segments.push(Segment {
                    index,
                    url,
                    byte_range,
                });
            }

            Ok(ParsedPlaylist::Media(MediaPlaylist {
                base_url: base_url.clone(),
                segments,
                end_list: media.end_list,
                encrypted,
            }))
        }
    }
}

/// Pick one variant. Non-default policies fall back to the first variant when nothing matches.
pub fn select_variant<'a>(
    variants: &'a [VariantStream],
    policy: &VariantSelectionPolicy,
) -> Option<&'a VariantStream> {
    let first = variants.first()?;
    let chosen = match policy {
        VariantSelectionPolicy::First => Some(first),
        // rev() so ties go to the earlier variant
        VariantSelectionPolicy::HighestBandwidth => variants.iter().rev().max_by_key(|v| v.bandwidth),
        VariantSelectionPolicy::LowestBandwidth => variants.iter().min_by_key(|v| v.bandwidth),
        VariantSelectionPolicy::ClosestToBandwidth(target) => variants
            .iter()
            .min_by_key(|v| v.bandwidth.abs_diff(*target)),
        VariantSelectionPolicy::MatchingResolution { width, height } => variants
            .iter()
            .find(|v| v.resolution == Some((*width, *height))),
        VariantSelectionPolicy::UriContains(text) => {
            variants.iter().find(|v| v.uri.contains(text.as_str()))
        }
    };

    Some(chosen.unwrap_or_else(|| {
        warn!(policy = ?policy, uri = %first.uri, "No variant matches the selection policy, using the first one");
        first
    }))
}

/// Keep the variant's scheme, host and path; union the query parameters.
///
/// Parameters from `original` keep their order; a key present in `variant`
/// takes the variant's values, and keys only the variant has are appended.
pub fn merge_query_params(original: &Url, variant: &Url) -> Url {
    let mut merged: Vec<(String, Vec<String>)> = group_query(original);
    for (key, values) in group_query(variant) {
        match merged.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = values,
            None => merged.push((key, values)),
        }
    }

    let mut url = variant.clone();
    if merged.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(merged.iter().flat_map(|(key, values)| {
                values.iter().map(move |value| (key.as_str(), value.as_str()))
            }));
    }
    url
}

fn group_query(url: &Url) -> Vec<(String, Vec<String>)> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in url.query_pairs().into_owned() {
        match grouped.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1.push(value),
            None => grouped.push((key, vec![value])),
        }
    }
    grouped
}

/// Output of resolution: the concrete media playlist and its segments.
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    pub media_url: Url,
    pub variant: Option<VariantStream>,
    pub segments: Vec<Segment>,
    pub end_list: bool,
}

pub struct PlaylistResolver {
    transport: Arc<dyn HttpTransport>,
    config: PlaylistConfig,
}

impl PlaylistResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, config: PlaylistConfig) -> Self {
        Self { transport, config }
    }

    /// Fetch the playlist the job was started with.
    pub async fn fetch(&self, playlist: &PlaylistRef) -> Result<FetchedText, VodError> {
        info!(url = %playlist.url, "Fetching playlist");
        Ok(self
            .transport
            .fetch_text(
                playlist.as_str(),
                Some(playlist.as_str()),
                self.config.fetch_timeout,
            )
            .await?)
    }

    /// Turn fetched playlist text into a media playlist, following one master level.
    pub async fn resolve(
        &self,
        playlist: &PlaylistRef,
        fetched: FetchedText,
    ) -> Result<ResolvedPlaylist, VodError> {
        let base_url = effective_url(&fetched, &playlist.url);

        match parse_playlist(&fetched.body, &base_url)? {
            ParsedPlaylist::Media(media) => {
                debug!(url = %base_url, "Input is a media playlist");
                finish(base_url, None, media)
            }
            ParsedPlaylist::Master(variants) => {
                info!(url = %base_url, variants = variants.len(), "Input is a master playlist");
                let variant = select_variant(&variants, &self.config.variant_selection_policy)
                    .cloned()
                    .ok_or_else(|| {
                        VodError::PlaylistEmpty(format!(
                            "master playlist {base_url} lists no playable variants"
                        ))
                    })?;

                let joined = base_url.join(&variant.uri).map_err(|e| {
                    VodError::Parse(format!(
                        "variant URI '{}' cannot be resolved against {base_url}: {e}",
                        variant.uri
                    ))
                })?;
                let media_url = merge_query_params(&playlist.url, &joined);
                info!(
                    url = %media_url,
                    bandwidth = variant.bandwidth,
                    "Selected variant, fetching media playlist"
                );

                let fetched = self
                    .transport
                    .fetch_text(
                        media_url.as_str(),
                        Some(playlist.as_str()),
                        self.config.fetch_timeout,
                    )
                    .await?;
                let media_base = effective_url(&fetched, &media_url);

                match parse_playlist(&fetched.body, &media_base)? {
                    ParsedPlaylist::Media(media) => finish(media_base, Some(variant), media),
                    ParsedPlaylist::Master(_) => Err(VodError::Parse(format!(
                        "expected a media playlist at {media_base}, got another master playlist"
                    ))),
                }
            }
        }
    }
}

fn effective_url(fetched: &FetchedText, requested: &Url) -> Url {
    Url::parse(&fetched.effective_url).unwrap_or_else(|_| requested.clone())
}

fn finish(
    media_url: Url,
    variant: Option<VariantStream>,
    media: MediaPlaylist,
) -> Result<ResolvedPlaylist, VodError> {
    if media.segments.is_empty() {
        return Err(VodError::PlaylistEmpty(format!(
            "media playlist {media_url} contains no segments"
        )));
    }
    if !media.end_list {
        warn!(url = %media_url, "Playlist has no #EXT-X-ENDLIST; downloading the segments listed right now only");
    }
    if media.encrypted {
        warn!(url = %media_url, "Playlist segments are encrypted; they are downloaded as-is and the output may not play");
    }

    info!(url = %media_url, segments = media.segments.len(), "Resolved media playlist");
    Ok(ResolvedPlaylist {
        media_url,
        variant,
        segments: media.segments,
        end_list: media.end_list,
    })
}
