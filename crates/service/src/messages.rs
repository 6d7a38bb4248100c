//! Texts sent back to the user.

pub const GREETING: &str = "👋 Hello!\n\n\
I replace the background of PPTX decks.\n\
1. Send me a .pptx file.\n\
2. Then send an image for the new background.";

pub const WRONG_FORMAT: &str = "❌ Please send a .pptx file only.";

pub const SEND_DECK_FIRST: &str = "⚠️ Please send a .pptx file first.";

pub const PROCESSING: &str = "⏳ Preparing your file...";

pub const DONE_CAPTION: &str = "✅ Here is your new deck!";

pub const FAILED: &str = "❌ Sorry, the file could not be processed. \
It may be corrupted or too complex.";

pub fn deck_accepted(file_name: &str) -> String {
    format!(
        "✅ {} received.\n\n🖼 Now send an image for the new background.",
        file_name
    )
}
