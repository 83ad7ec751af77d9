//! Embedded viewer page and static assets
//!
//! Everything the server hands to a browser is compiled in; there is no
//! filesystem lookup at request time.

/// The interactive viewer page served at `/`
///
/// Self-contained: polls `/cues` on a fixed interval and renders the cue
/// table, clocks, and highlight rules client-side.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Cue List</title>
<link rel="manifest" href="/manifest.json">
<style>
  body { margin: 0; font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif;
         background: #111; color: #eee; }
  header { display: flex; justify-content: space-between; align-items: baseline;
           padding: 10px 16px; background: #1c1c1c; }
  header h1 { margin: 0; font-size: 1.2em; }
  #clocks { font-variant-numeric: tabular-nums; }
  #clocks span { margin-left: 14px; }
  table { width: 100%; border-collapse: collapse; }
  th, td { padding: 6px 10px; text-align: left; border-bottom: 1px solid #2a2a2a; }
  tr.active { background: #294; }
  tr.selected { outline: 2px solid #58f; }
  td.struck { text-decoration: line-through; opacity: 0.5; }
  #status { padding: 6px 16px; color: #888; font-size: 0.85em; }
</style>
</head>
<body>
<header>
  <h1 id="stack-name">&mdash;</h1>
  <div id="clocks">
    <span id="wall-clock"></span>
    <span id="countdown"></span>
    <span id="countup"></span>
  </div>
</header>
<table>
  <thead id="columns"></thead>
  <tbody id="cues"></tbody>
</table>
<div id="status">Connecting&hellip;</div>
<script>
var POLL_MS = 2000;

function pad(n) { return (n < 10 ? "0" : "") + n; }

function formatSeconds(total) {
  var sign = total < 0 ? "-" : "";
  total = Math.abs(total);
  var m = Math.floor(total / 60), s = total % 60;
  return sign + pad(m) + ":" + pad(s);
}

function highlight(text, rules) {
  for (var i = 0; i < rules.length; i++) {
    if (text.indexOf(rules[i].keyword) !== -1) {
      return "#" + rules[i].color;
    }
  }
  return null;
}

function render(data) {
  document.getElementById("stack-name").textContent = data.cueStackName || "-";
  document.getElementById("wall-clock").textContent =
    data.currentTime + " " + data.currentAMPM;
  document.getElementById("countdown").textContent =
    data.countdownRunning ? "↓ " + formatSeconds(data.countdownTime) : "";
  document.getElementById("countup").textContent =
    data.countUpRunning ? "↑ " + formatSeconds(data.countUpTime) : "";

  var head = "<tr>";
  data.columns.forEach(function (col) {
    head += "<th style=\"min-width:" + col.width + "px\">" + col.name + "</th>";
  });
  document.getElementById("columns").innerHTML = head + "</tr>";

  var body = "";
  data.cues.forEach(function (cue) {
    var classes = [];
    if (cue.index === data.activeCueIndex) classes.push("active");
    if (cue.index === data.selectedCueIndex) classes.push("selected");
    body += "<tr class=\"" + classes.join(" ") + "\">";
    cue.values.forEach(function (value, i) {
      var color = highlight(value, data.highlightColors);
      var style = color ? " style=\"color:" + color + "\"" : "";
      var struck = cue.struck[i] ? " class=\"struck\"" : "";
      body += "<td" + struck + style + ">" + value + "</td>";
    });
    body += "</tr>";
  });
  document.getElementById("cues").innerHTML = body;

  document.getElementById("status").textContent =
    "Updated " + data.currentTime + " " + data.currentAMPM;
}

function poll() {
  fetch("/cues", { cache: "no-store" })
    .then(function (res) { return res.json(); })
    .then(render)
    .catch(function () {
      document.getElementById("status").textContent = "Connection lost, retrying…";
    });
}

poll();
setInterval(poll, POLL_MS);
</script>
</body>
</html>
"##;

/// One fixed static asset
pub struct StaticAsset {
    pub content_type: &'static str,
    pub body: &'static str,
}

const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Cue List - Offline</title>
<link rel="stylesheet" href="/offline.css">
</head>
<body>
<h1>Offline</h1>
<p>The cue server is not reachable. Reconnect to the show network and reload.</p>
<script src="/offline.js"></script>
</body>
</html>
"#;

const OFFLINE_JS: &str = r#"setInterval(function () {
  fetch("/health", { cache: "no-store" })
    .then(function (res) { if (res.ok) location.replace("/"); })
    .catch(function () {});
}, 5000);
"#;

const OFFLINE_CSS: &str = r#"body {
  font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif;
  background: #111;
  color: #eee;
  text-align: center;
  padding-top: 20vh;
}
"#;

const MANIFEST_JSON: &str = r##"{
  "name": "Cue List",
  "short_name": "Cues",
  "start_url": "/",
  "display": "standalone",
  "background_color": "#111111",
  "theme_color": "#111111"
}
"##;

/// Look up a fixed asset by path
pub fn lookup(path: &str) -> Option<StaticAsset> {
    match path {
        "/offline.html" => Some(StaticAsset {
            content_type: "text/html; charset=utf-8",
            body: OFFLINE_HTML,
        }),
        "/offline.js" => Some(StaticAsset {
            content_type: "application/javascript",
            body: OFFLINE_JS,
        }),
        "/offline.css" => Some(StaticAsset {
            content_type: "text/css",
            body: OFFLINE_CSS,
        }),
        "/manifest.json" => Some(StaticAsset {
            content_type: "application/manifest+json",
            body: MANIFEST_JSON,
        }),
        _ => None,
    }
}
