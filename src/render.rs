//! Plain-text screens for the terminal

use std::fmt::Write;

use crate::reading::AuraReading;
use crate::session::SessionState;

const TITLE: &str = "Aura Vision";

/// Render the screen for a session state
pub fn render(state: &SessionState) -> String {
    match state {
        SessionState::Start { error } => {
            let mut out = format!(
                "{}\nUnlock the secrets of your spiritual energy. Gaze into the camera and let us reveal the colors of your soul.\n",
                TITLE
            );
            if let Some(error) = error {
                let _ = writeln!(out, "Oh no! {}", error);
            }
            out
        }
        SessionState::Camera { error: Some(error) } => format!("{}\n", error),
        SessionState::Camera { error: None } => {
            "Gaze into the lens. Center yourself within the halo.\n".to_string()
        }
        SessionState::Processing { .. } => "Connecting with the cosmos...\n".to_string(),
        SessionState::Readout { image, reading } => {
            let (width, height) = image.dimensions();
            let mut out = format!("Your Aura Revealed ({}x{} capture)\n\n", width, height);
            render_reading(&mut out, reading);
            out
        }
    }
}

fn render_reading(out: &mut String, reading: &AuraReading) {
    let _ = writeln!(out, "{}\n", reading.aura_color_insight);
    let _ = writeln!(out, "{}\n", reading.future_glimpse);
    let _ = writeln!(out, "Primary Aura Colors: {}\n", reading.primary_colors.join("  "));
    let _ = writeln!(
        out,
        "Your guiding number is {}. Keep an eye out for it as a sign of alignment and encouragement from your spiritual guides.\n",
        reading.angel_number
    );
    let _ = writeln!(out, "{}", reading.spiritual_guidance);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CapturedImage;

    #[test]
    fn test_start_screen_shows_error() {
        let screen = render(&SessionState::Start {
            error: Some("Failed to connect with the cosmos. Please try again.".to_string()),
        });

        assert!(screen.starts_with(TITLE));
        assert!(screen.contains("Oh no! Failed to connect"));
    }

    #[test]
    fn test_camera_screen_prefers_error() {
        let screen = render(&SessionState::Camera {
            error: Some("Camera access was denied.".to_string()),
        });

        assert_eq!(screen, "Camera access was denied.\n");
    }

    #[test]
    fn test_readout_screen_lists_reading() {
        let reading = AuraReading {
            aura_color_insight: "Indigo light.".to_string(),
            future_glimpse: "Good news.".to_string(),
            angel_number: 444,
            spiritual_guidance: "Breathe.".to_string(),
            primary_colors: vec!["#112233".to_string(), "#445566".to_string(), "#778899".to_string()],
        };
        let screen = render(&SessionState::Readout {
            image: CapturedImage::from_jpeg(vec![0xFF, 0xD8], 720, 720),
            reading,
        });

        assert!(screen.contains("720x720"));
        assert!(screen.contains("#112233  #445566  #778899"));
        assert!(screen.contains("guiding number is 444"));
        assert!(screen.trim_end().ends_with("Breathe."));
    }
}
