/*!
Upstream "currently playing" payloads and the normalized snapshot
handed to the presentation layer.

Every field of the snapshot is defaulted when upstream leaves it out,
so nothing null ever reaches something that gets rendered directly.
*/
use serde_json::{Map, Value};

pub const NOTHING_PLAYING_MESSAGE: &str = "No track currently playing";
const UNKNOWN_TRACK: &str = "Unknown Track";
const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";
const UNKNOWN_DEVICE: &str = "Unknown Device";
const UNKNOWN_DEVICE_TYPE: &str = "Unknown";

// upstream shapes. everything is optional, the provider omits
// fields freely depending on what's loaded (tracks, episodes, ads).

#[derive(serde::Deserialize, Debug, Default, Clone)]
pub struct SpotifyCurrentlyPlaying {
    pub is_playing: Option<bool>,
    pub progress_ms: Option<u64>,
    pub item: Option<SpotifyItem>,
    pub device: Option<SpotifyDevice>,
}

#[derive(serde::Deserialize, Debug, Default, Clone)]
pub struct SpotifyItem {
    pub name: Option<String>,
    pub artists: Option<Vec<SpotifyArtist>>,
    pub album: Option<SpotifyAlbum>,
    pub duration_ms: Option<u64>,
    pub external_urls: Option<Map<String, Value>>,
}

#[derive(serde::Deserialize, Debug, Default, Clone)]
pub struct SpotifyArtist {
    pub name: Option<String>,
}

#[derive(serde::Deserialize, Debug, Default, Clone)]
pub struct SpotifyAlbum {
    pub name: Option<String>,
    pub images: Option<Vec<SpotifyImage>>,
}

#[derive(serde::Deserialize, Debug, Default, Clone)]
pub struct SpotifyImage {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(serde::Deserialize, Debug, Default, Clone)]
pub struct SpotifyDevice {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// What the provider reported for the current playback state
#[derive(Debug, Clone)]
pub enum Playback {
    Nothing,
    Current(SpotifyCurrentlyPlaying),
}

// normalized shapes

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Image {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Album {
    pub name: String,
    pub images: Vec<Image>,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    pub artists: Vec<String>,
    pub album: Album,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(rename = "progress")]
    pub progress_ms: u64,
    pub external_urls: Map<String, Value>,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct NowPlaying {
    #[serde(rename = "isPlaying")]
    pub is_playing: bool,
    pub track: Track,
    pub device: Device,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct NothingPlaying {
    #[serde(rename = "isPlaying")]
    pub is_playing: bool,
    pub message: String,
}

/// Display-ready playback state. Either a loaded track (possibly paused)
/// or a message saying nothing is loaded, never both.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum TrackSnapshot {
    Playing(NowPlaying),
    NotPlaying(NothingPlaying),
}

impl TrackSnapshot {
    pub fn nothing_playing() -> Self {
        TrackSnapshot::NotPlaying(NothingPlaying {
            is_playing: false,
            message: NOTHING_PLAYING_MESSAGE.to_string(),
        })
    }

    pub fn is_playing(&self) -> bool {
        match self {
            TrackSnapshot::Playing(p) => p.is_playing,
            TrackSnapshot::NotPlaying(_) => false,
        }
    }

    pub fn track(&self) -> Option<&Track> {
        match self {
            TrackSnapshot::Playing(p) => Some(&p.track),
            TrackSnapshot::NotPlaying(_) => None,
        }
    }
}

impl From<Playback> for TrackSnapshot {
    fn from(playback: Playback) -> Self {
        match playback {
            Playback::Nothing => TrackSnapshot::nothing_playing(),
            Playback::Current(current) => TrackSnapshot::Playing(current.into()),
        }
    }
}

impl From<SpotifyCurrentlyPlaying> for NowPlaying {
    fn from(current: SpotifyCurrentlyPlaying) -> Self {
        let item = current.item.unwrap_or_default();
        let album = item.album.unwrap_or_default();
        let device = current.device.unwrap_or_default();

        let mut artists = item
            .artists
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.name)
            .collect::<Vec<_>>();
        if artists.is_empty() {
            artists.push(UNKNOWN_ARTIST.to_string());
        }

        // an image without a url has nothing to render
        let images = album
            .images
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| {
                let (width, height) = (i.width, i.height);
                i.url.map(|url| Image { url, width, height })
            })
            .collect::<Vec<_>>();

        NowPlaying {
            is_playing: current.is_playing.unwrap_or(false),
            track: Track {
                name: item.name.unwrap_or_else(|| UNKNOWN_TRACK.to_string()),
                artists,
                album: Album {
                    name: album.name.unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
                    images,
                },
                duration_ms: item.duration_ms.unwrap_or(0),
                progress_ms: current.progress_ms.unwrap_or(0),
                external_urls: item.external_urls.unwrap_or_default(),
            },
            device: Device {
                name: device.name.unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
                kind: device.kind.unwrap_or_else(|| UNKNOWN_DEVICE_TYPE.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(raw: Value) -> Value {
        let current: SpotifyCurrentlyPlaying = serde_json::from_value(raw).unwrap();
        serde_json::to_value(TrackSnapshot::from(Playback::Current(current))).unwrap()
    }

    #[test]
    fn normalizes_full_payload() {
        let out = normalize(json!({
            "is_playing": true,
            "progress_ms": 120000,
            "timestamp": 1616161616161i64,
            "item": {
                "name": "Test Song",
                "artists": [{"name": "Test Artist"}, {"name": "Featured"}],
                "album": {
                    "name": "Test Album",
                    "images": [{"url": "https://example.com/image.jpg", "width": 640, "height": 640}]
                },
                "duration_ms": 240000,
                "external_urls": {"spotify": "https://open.spotify.com/track/123"}
            },
            "device": {"name": "Test Device", "type": "Computer"}
        }));
        assert_eq!(
            out,
            json!({
                "isPlaying": true,
                "track": {
                    "name": "Test Song",
                    "artists": ["Test Artist", "Featured"],
                    "album": {
                        "name": "Test Album",
                        "images": [{"url": "https://example.com/image.jpg", "width": 640, "height": 640}]
                    },
                    "duration": 240000,
                    "progress": 120000,
                    "external_urls": {"spotify": "https://open.spotify.com/track/123"}
                },
                "device": {"name": "Test Device", "type": "Computer"}
            })
        );
    }

    #[test]
    fn empty_artists_get_placeholder() {
        let out = normalize(json!({
            "is_playing": false,
            "item": {"name": "Quiet", "artists": [], "album": {"name": "A"}}
        }));
        assert_eq!(out["track"]["artists"], json!(["Unknown Artist"]));
        assert_eq!(out["isPlaying"], json!(false));
    }

    #[test]
    fn unnamed_artists_are_dropped() {
        let out = normalize(json!({
            "item": {"artists": [{"id": "x"}, {"name": "Named"}]}
        }));
        assert_eq!(out["track"]["artists"], json!(["Named"]));
    }

    #[test]
    fn missing_images_are_an_empty_list() {
        let out = normalize(json!({
            "is_playing": true,
            "item": {"name": "Song", "artists": [{"name": "A"}], "album": {"name": "Album"}}
        }));
        assert_eq!(out["track"]["album"]["images"], json!([]));
        let out = normalize(json!({"is_playing": true, "item": {"name": "Song"}}));
        assert_eq!(out["track"]["album"]["images"], json!([]));
    }

    #[test]
    fn everything_missing_is_defaulted() {
        let out = normalize(json!({"is_playing": true, "device": {"name": "Phone"}}));
        assert_eq!(
            out,
            json!({
                "isPlaying": true,
                "track": {
                    "name": "Unknown Track",
                    "artists": ["Unknown Artist"],
                    "album": {"name": "Unknown Album", "images": []},
                    "duration": 0,
                    "progress": 0,
                    "external_urls": {}
                },
                "device": {"name": "Phone", "type": "Unknown"}
            })
        );
        let out = normalize(json!({}));
        assert_eq!(out["device"], json!({"name": "Unknown Device", "type": "Unknown"}));
        assert!(out.get("message").is_none());
    }

    #[test]
    fn nothing_playing_shape() {
        let snap = TrackSnapshot::from(Playback::Nothing);
        assert!(snap.track().is_none());
        assert!(!snap.is_playing());
        assert_eq!(
            serde_json::to_value(snap).unwrap(),
            json!({"isPlaying": false, "message": "No track currently playing"})
        );
    }

    #[test]
    fn images_without_url_are_dropped() {
        let raw = json!({
            "is_playing": true,
            "item": {
                "name": "Song",
                "artists": [{"name": "Band"}],
                "album": {
                    "name": "Album",
                    "images": [
                        {"url": null, "width": 64, "height": 64},
                        {"width": 300, "height": 300},
                        {"url": "https://example.com/640.jpg", "width": 640, "height": 640}
                    ]
                }
            }
        });
        let out = normalize(raw);
        assert_eq!(
            out["track"]["album"]["images"],
            json!([{"url": "https://example.com/640.jpg", "width": 640, "height": 640}])
        );
        assert_eq!(out["track"]["name"], json!("Song"));
        assert_eq!(out["track"]["artists"], json!(["Band"]));
    }

    #[test]
    fn images_without_dimensions_stay_bare() {
        let out = normalize(json!({
            "item": {"album": {"images": [{"url": "https://example.com/a.jpg", "width": null, "height": null}]}}
        }));
        assert_eq!(
            out["track"]["album"]["images"],
            json!([{"url": "https://example.com/a.jpg"}])
        );
    }
}
