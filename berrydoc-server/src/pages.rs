// Server-rendered pages

use axum::http::StatusCode;
use berrydoc_eye::DetectionResult;
use std::fmt::Write as _;

const STYLE: &str = r#"
    body { font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 1.5rem; color: #222; }
    header a { color: #c0392b; text-decoration: none; font-weight: 600; margin-right: 1rem; }
    h1 { color: #c0392b; }
    .card { border: 1px solid #ddd; border-radius: 8px; padding: 1rem; margin: 1rem 0; }
    table { border-collapse: collapse; width: 100%; }
    th, td { border-bottom: 1px solid #eee; padding: .4rem; text-align: left; }
    img.result { max-width: 100%; border-radius: 6px; }
    #chat-log .msg { margin: .5rem 0; padding: .5rem; border-radius: 6px; background: #f7f7f7; }
    #chat-log .user { background: #fdecea; }
    .error { color: #c0392b; }
    .stage { position: relative; display: inline-block; }
    .stage canvas { position: absolute; left: 0; top: 0; }
"#;

/// Escape text for HTML element content and quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="id">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - BerryDoc</title>
    <style>{style}</style>
</head>
<body>
    <header><a href="/">Unggah Gambar</a><a href="/realtime">Kamera</a></header>
{body}
</body>
</html>
"#,
        title = escape_html(title),
        style = STYLE,
        body = body,
    )
}

pub fn landing() -> String {
    layout(
        "Deteksi Penyakit Stroberi",
        r#"    <h1>Deteksi Penyakit Tanaman Stroberi</h1>
    <div class="card">
        <p>Unggah foto daun, bunga, atau buah stroberi untuk mendeteksi penyakitnya.</p>
        <form action="/deteksi" method="post" enctype="multipart/form-data">
            <input type="file" name="image" accept="image/*" required>
            <button type="submit">Deteksi</button>
        </form>
    </div>
    <p>Atau gunakan <a href="/realtime">kamera</a> untuk deteksi langsung.</p>"#,
    )
}

/// Detail view of one stored result, with the assistant chat
pub fn detail(result: &DetectionResult) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        r#"    <h1>Hasil Deteksi</h1>
    <div class="card">
        <p><strong>Hasil:</strong> <span id="result">{summary}</span></p>
        <p><strong>Berkas:</strong> {source}</p>
        <p><strong>Waktu:</strong> {captured}</p>
"#,
        summary = escape_html(&result.summary),
        source = escape_html(&result.source_name),
        captured = result.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    if let Some(url) = &result.annotated_image {
        let _ = writeln!(
            body,
            r#"        <img class="result" src="{}" alt="Gambar hasil deteksi">"#,
            escape_html(url)
        );
    }

    if !result.detections.is_empty() {
        body.push_str(
            "        <table>\n            <tr><th>#</th><th>Penyakit</th><th>Keyakinan</th><th>Kotak (x1, y1, x2, y2)</th></tr>\n",
        );
        for (i, detection) in result.detections.iter().enumerate() {
            let [x1, y1, x2, y2] = detection.bbox;
            let _ = writeln!(
                body,
                "            <tr class=\"detection\"><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.0}, {:.0}, {:.0}, {:.0}</td></tr>",
                i + 1,
                escape_html(&detection.label),
                detection.confidence,
                x1,
                y1,
                x2,
                y2
            );
        }
        body.push_str("        </table>\n");
    }
    body.push_str("    </div>\n");

    let _ = write!(
        body,
        r#"    <div class="card" id="chat" data-disease="{disease}">
        <h2>Tanya Asisten</h2>
        <div id="chat-log"></div>
        <form id="chat-form">
            <input id="chat-message" type="text" placeholder="Tulis pertanyaan..." required>
            <button type="submit">Kirim</button>
        </form>
    </div>
    <script>
{script}
    </script>"#,
        disease = escape_html(&result.summary),
        script = CHAT_SCRIPT,
    );

    layout("Hasil Deteksi", &body)
}

const CHAT_SCRIPT: &str = r#"
    const chat = document.getElementById('chat');
    const log = document.getElementById('chat-log');
    const input = document.getElementById('chat-message');

    function escapeText(text) {
        const div = document.createElement('div');
        div.textContent = text;
        return div.innerHTML;
    }

    // **bold** and "* " bullets, applied after escaping
    function renderMarkup(text) {
        return escapeText(text)
            .split('\n')
            .map(line => line.replace(/\*\*(.+?)\*\*/g, '<strong>$1</strong>'))
            .map(line => /^\s*\* /.test(line) ? '&bull; ' + line.replace(/^\s*\* /, '') : line)
            .join('<br>');
    }

    function append(cls, html) {
        const div = document.createElement('div');
        div.className = 'msg ' + cls;
        div.innerHTML = html;
        log.appendChild(div);
    }

    document.getElementById('chat-form').addEventListener('submit', async (event) => {
        event.preventDefault();
        const message = input.value.trim();
        if (!message) return;
        append('user', escapeText(message));
        input.value = '';
        try {
            const res = await fetch('/chatbot', {
                method: 'POST',
                headers: {'Content-Type': 'application/json'},
                body: JSON.stringify({message: message, disease: chat.dataset.disease}),
            });
            const data = await res.json();
            if (res.ok) {
                append('bot', renderMarkup(data.response));
            } else {
                append('bot error', escapeText(data.error || 'Terjadi kesalahan'));
            }
        } catch (err) {
            append('bot error', 'Gagal menghubungi server');
        }
    });
"#;

/// Camera capture page: single capture or continuous overlay
pub fn realtime() -> String {
    let body = format!(
        r#"    <h1>Deteksi Langsung</h1>
    <div class="card">
        <div class="stage">
            <video id="video" autoplay playsinline muted width="640" height="480"></video>
            <canvas id="overlay" width="640" height="480"></canvas>
        </div>
        <canvas id="frame" width="640" height="480" hidden></canvas>
        <p>
            <button id="capture">Ambil Gambar</button>
            <button id="toggle">Mulai Deteksi Berkelanjutan</button>
        </p>
        <p id="status"></p>
    </div>
    <script>
{script}
    </script>"#,
        script = REALTIME_SCRIPT,
    );
    layout("Deteksi Langsung", &body)
}

const REALTIME_SCRIPT: &str = r#"
    const video = document.getElementById('video');
    const frame = document.getElementById('frame');
    const overlay = document.getElementById('overlay');
    const status = document.getElementById('status');
    const toggle = document.getElementById('toggle');
    let running = false;

    navigator.mediaDevices.getUserMedia({video: true})
        .then(stream => { video.srcObject = stream; })
        .catch(() => { status.textContent = 'Kamera tidak dapat diakses'; });

    function snapshot() {
        frame.getContext('2d').drawImage(video, 0, 0, frame.width, frame.height);
        return frame.toDataURL('image/jpeg', 0.85);
    }

    async function post(url) {
        const res = await fetch(url, {
            method: 'POST',
            headers: {'Content-Type': 'application/json'},
            body: JSON.stringify({image: snapshot()}),
        });
        const data = await res.json();
        if (!res.ok) throw new Error(data.error || 'Terjadi kesalahan');
        return data;
    }

    function draw(detections) {
        const ctx = overlay.getContext('2d');
        ctx.clearRect(0, 0, overlay.width, overlay.height);
        ctx.lineWidth = 2;
        ctx.font = '14px sans-serif';
        for (const d of detections) {
            const [x1, y1, x2, y2] = d.box;
            ctx.strokeStyle = '#e74c3c';
            ctx.strokeRect(x1, y1, x2 - x1, y2 - y1);
            const tag = d.label + ' ' + d.confidence.toFixed(2);
            ctx.fillStyle = '#e74c3c';
            ctx.fillRect(x1, Math.max(0, y1 - 18), ctx.measureText(tag).width + 8, 18);
            ctx.fillStyle = '#fff';
            ctx.fillText(tag, x1 + 4, Math.max(14, y1 - 4));
        }
    }

    document.getElementById('capture').addEventListener('click', async () => {
        status.textContent = 'Memproses...';
        try {
            const data = await post('/realtime_detect');
            window.location.href = data.redirect;
        } catch (err) {
            status.textContent = err.message;
        }
    });

    // Each frame stands alone: an empty answer clears the overlay
    async function loop() {
        while (running) {
            try {
                const data = await post('/realtime_detect_continuous');
                draw(data.detections);
                status.textContent = data.result;
            } catch (err) {
                status.textContent = err.message;
            }
            await new Promise(resolve => setTimeout(resolve, 500));
        }
        draw([]);
    }

    toggle.addEventListener('click', () => {
        running = !running;
        toggle.textContent = running ? 'Hentikan' : 'Mulai Deteksi Berkelanjutan';
        if (running) loop();
    });
"#;

pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        r#"    <h1>{code}</h1>
    <div class="card">
        <p class="error">{message}</p>
        <p><a href="/">Kembali ke halaman utama</a></p>
    </div>"#,
        code = status.as_u16(),
        message = escape_html(message),
    );
    layout(status.canonical_reason().unwrap_or("Error"), &body)
}
