//! HTML for the chat page.
//!
//! The page is rendered with the current history so it shows something even
//! before its script runs. Once the WebSocket opens the server replays the
//! same history, so the script drops the pre-rendered rows first.

use crate::config::WebPageConfig;
use crate::message::ChatMessage;

/// How the provider column is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub shorten_provider: bool,
    pub hide_provider: bool,
}

impl From<&WebPageConfig> for DisplayOptions {
    fn from(config: &WebPageConfig) -> Self {
        Self {
            shorten_provider: config.shorten_provider,
            hide_provider: config.hide_provider,
        }
    }
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8"/>
  <meta name="viewport" content="width=device-width, initial-scale=1.0"/>
  <title>Chat</title>
  <style>
    body { font-family: sans-serif; overflow: hidden; background-color: #18181b; color: lightgray; }
    #chatbox { height: 95vh; overflow-y: auto; display: flex; flex-direction: column; }
    #fill { flex-grow: 1; }
    .message { display: flex; flex-direction: row; margin-bottom: 5px; width: 100%; }
    .provider { min-width: 70px; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
    .user { min-width: 100px; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; text-align: right; padding-right: 10px; }
    .content { flex-grow: 1; overflow-wrap: anywhere; }
  </style>
</head>
<body>
  <div id="chatbox">
    <div id="fill"></div>
"#;

const PAGE_SCRIPT: &str = r#"  <script>
    const chatbox = document.getElementById('chatbox');
    const scheme = window.location.protocol === 'https:' ? 'wss://' : 'ws://';
    const ws = new WebSocket(scheme + window.location.host + '/ws');

    function cell(cls, text) {
      const el = document.createElement('div');
      el.classList.add(cls);
      el.textContent = text;
      return el;
    }

    ws.onopen = () => {
      chatbox.querySelectorAll('.message').forEach((el) => el.remove());
    };

    ws.onmessage = (event) => {
      const message = JSON.parse(event.data);
      const row = document.createElement('div');
      row.classList.add('message');
      if (!DISPLAY.hideProvider) {
        row.appendChild(cell('provider', DISPLAY.shortenProvider ? message.ProviderShortName : message.Provider));
      }
      row.appendChild(cell('user', message.AuthorName + ':'));
      row.appendChild(cell('content', message.Content));
      chatbox.appendChild(row);
      chatbox.scrollTop = chatbox.scrollHeight;
    };
  </script>
</body>
</html>
"#;

/// Escape text for use in HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render_row(out: &mut String, message: &ChatMessage, display: DisplayOptions) {
    out.push_str("    <div class=\"message\">");
    if !display.hide_provider {
        out.push_str("<div class=\"provider\">");
        out.push_str(&escape_html(
            message.display_provider(display.shorten_provider),
        ));
        out.push_str("</div>");
    }
    out.push_str("<div class=\"user\">");
    out.push_str(&escape_html(&message.author_name));
    out.push_str(":</div><div class=\"content\">");
    out.push_str(&escape_html(&message.content));
    out.push_str("</div></div>\n");
}

/// Render the full page with `messages` pre-rendered, oldest first.
pub fn render_page(messages: &[ChatMessage], display: DisplayOptions) -> String {
    let mut out = String::with_capacity(PAGE_HEAD.len() + PAGE_SCRIPT.len() + messages.len() * 160);
    out.push_str(PAGE_HEAD);
    for message in messages {
        render_row(&mut out, message, display);
    }
    out.push_str("  </div>\n");
    out.push_str(&format!(
        "  <script>const DISPLAY = {{ shortenProvider: {}, hideProvider: {} }};</script>\n",
        display.shorten_provider, display.hide_provider
    ));
    out.push_str(PAGE_SCRIPT);
    out
}
