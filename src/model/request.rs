//! Conversation structure sent to the model for one video

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// One piece of a chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Video {
        video: String,
        fps: f64,
        max_frames: u32,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

/// Borrowed view of the video part of a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoRef<'a> {
    pub path: &'a str,
    pub fps: f64,
    pub max_frames: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InferenceRequest {
    pub messages: Vec<ChatTurn>,
}

impl InferenceRequest {
    /// Single user turn: the video reference followed by the prompt
    pub fn for_video(video_path: &str, prompt: &str, fps: f64, max_frames: u32) -> Self {
        Self {
            messages: vec![ChatTurn {
                role: Role::User,
                content: vec![
                    ContentPart::Video {
                        video: video_path.to_string(),
                        fps,
                        max_frames,
                    },
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
        }
    }

    fn parts(&self) -> impl Iterator<Item = &ContentPart> {
        self.messages.iter().flat_map(|turn| turn.content.iter())
    }

    /// First video part, if any
    pub fn video(&self) -> Option<VideoRef<'_>> {
        self.parts().find_map(|part| match part {
            ContentPart::Video {
                video,
                fps,
                max_frames,
            } => Some(VideoRef {
                path: video,
                fps: *fps,
                max_frames: *max_frames,
            }),
            _ => None,
        })
    }

    /// All text parts joined by newlines
    pub fn text_prompt(&self) -> String {
        self.parts()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
