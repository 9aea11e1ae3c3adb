/// xterm.js page served at `/terminal/{handle}`. It attaches to
/// `/ws/{handle}` on the same origin; remote output arrives as binary
/// frames and keystrokes are sent as text. There is no reconnect: a
/// closed session cannot be attached again.
pub const TERMINAL_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>shellgate</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/xterm@5.3.0/css/xterm.css" />
    <script src="https://cdn.jsdelivr.net/npm/xterm@5.3.0/lib/xterm.js"></script>
    <script src="https://cdn.jsdelivr.net/npm/xterm-addon-fit@0.8.0/lib/xterm-addon-fit.js"></script>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            font-family: system-ui, sans-serif;
        }
        #terminal-container {
            width: 100%;
            height: calc(100vh - 70px);
        }
        .status {
            color: #888;
            font-size: 14px;
            margin-bottom: 10px;
        }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <div class="status" id="status">Connecting...</div>
    <div id="terminal-container"></div>

    <script>
        const term = new Terminal({
            cursorBlink: true,
            fontSize: 14,
            fontFamily: 'Menlo, Monaco, "Courier New", monospace',
            theme: {
                background: '#1e1e1e',
                foreground: '#d4d4d4',
            }
        });

        const fitAddon = new FitAddon.FitAddon();
        term.loadAddon(fitAddon);
        term.open(document.getElementById('terminal-container'));
        fitAddon.fit();

        const status = document.getElementById('status');
        const handle = window.location.pathname.split('/').filter(Boolean).pop();
        const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
        const ws = new WebSocket(`${protocol}//${window.location.host}/ws/${handle}`);
        ws.binaryType = 'arraybuffer';

        function sendResize() {
            if (ws.readyState === WebSocket.OPEN) {
                const { cols, rows } = term;
                ws.send(JSON.stringify({ type: 'resize', cols, rows }));
            }
        }

        ws.onopen = () => {
            status.textContent = `Session ${handle}`;
            status.className = 'status connected';
            sendResize();
            term.focus();
        };

        ws.onmessage = (event) => {
            if (event.data instanceof ArrayBuffer) {
                term.write(new Uint8Array(event.data));
            } else {
                term.write(event.data);
            }
        };

        ws.onclose = (event) => {
            status.textContent = event.reason
                ? `Session ended: ${event.reason}`
                : 'Session ended';
            status.className = 'status disconnected';
        };

        ws.onerror = (err) => {
            console.error('WebSocket error:', err);
        };

        term.onData((data) => {
            if (ws.readyState === WebSocket.OPEN) {
                ws.send(data);
            }
        });

        window.addEventListener('resize', () => {
            fitAddon.fit();
            sendResize();
        });
    </script>
</body>
</html>
"#;
