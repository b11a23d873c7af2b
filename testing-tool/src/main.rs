use anyhow::{anyhow, Result};
use chrono::Utc;
use colored::*;
use futures::StreamExt;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::time::Duration;

/// Simulador de equipos contra la API de seguimiento
#[tokio::main]
async fn main() -> Result<()> {
    println!("{}", "🚚 Crew Tracking - Simulador de equipos".bright_blue().bold());
    println!("{}", "=====================================".bright_blue());
    println!();

    let base_url = std::env::var("CREW_TRACKING_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    println!("{} {}", "🌐 Servidor:".bright_cyan(), base_url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let api = Api { client, base_url };

    loop {
        println!();
        println!("{}", "📋 MENÚ PRINCIPAL".bright_green().bold());
        println!("{}", "==================".bright_green());
        println!("1. 📍 Enviar un ping");
        println!("2. 🏃 Simular un trabajo completo");
        println!("3. 🗺️  Ver snapshot");
        println!("4. 📊 Generar reportes EOD");
        println!("5. 📡 Escuchar el stream en vivo");
        println!("6. 🚪 Salir");
        print!("{}", "Selecciona una opción (1-6): ".bright_yellow());
        io::stdout().flush()?;

        let choice = read_line()?;
        let result = match choice.as_str() {
            "1" => send_single_ping(&api).await,
            "2" => simulate_job(&api).await,
            "3" => show_snapshot(&api).await,
            "4" => generate_eod(&api).await,
            "5" => watch_stream(&api).await,
            "6" => {
                println!("{}", "👋 ¡Hasta luego!".bright_green());
                break;
            }
            _ => {
                println!("{}", "❌ Opción inválida. Intenta de nuevo.".bright_red());
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("{} {}", "❌ Error:".bright_red().bold(), e);
        }
    }

    Ok(())
}

struct Api {
    client: reqwest::Client,
    base_url: String,
}

impl Api {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(u16, Value)> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn get(&self, path: &str) -> Result<(u16, Value)> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn ping(&self, team_id: &str, lat: f64, lng: f64, status: &str) -> Result<Value> {
        let payload = json!({
            "team_id": team_id,
            "lat": lat,
            "lng": lng,
            "status": status,
            "timestamp": Utc::now(),
        });
        let (code, body) = self.post("/api/tracking/ping", &payload).await?;
        print_response(code, &body);
        Ok(body)
    }
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label.bright_yellow());
    io::stdout().flush()?;
    read_line()
}

fn prompt_f64(label: &str) -> Result<f64> {
    let raw = prompt(label)?;
    raw.parse()
        .map_err(|_| anyhow!("'{}' no es un número válido", raw))
}

fn print_response(code: u16, body: &Value) {
    let status = if (200..300).contains(&code) {
        format!("✅ HTTP {}", code).bright_green()
    } else {
        format!("❌ HTTP {}", code).bright_red()
    };
    println!("{}", status);
    println!(
        "{}",
        serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
    );
}

async fn send_single_ping(api: &Api) -> Result<()> {
    println!("{}", "📍 PING".bright_cyan().bold());
    let team_id = prompt("Team ID: ")?;
    let lat = prompt_f64("Latitud: ")?;
    let lng = prompt_f64("Longitud: ")?;
    let status = prompt("Estado (standby, en_route, arrived, in_progress, completed, cancelled): ")?;

    api.ping(&team_id, lat, lng, &status).await?;
    Ok(())
}

async fn simulate_job(api: &Api) -> Result<()> {
    println!("{}", "🏃 SIMULACIÓN DE TRABAJO".bright_cyan().bold());
    let team_id = prompt("Team ID: ")?;
    let job_id = prompt("Job ID: ")?;
    let lat = prompt_f64("Latitud inicial: ")?;
    let lng = prompt_f64("Longitud inicial: ")?;

    let (code, body) = api
        .post(
            "/api/tracking/sessions",
            &json!({ "job_id": job_id, "team_id": team_id }),
        )
        .await?;
    print_response(code, &body);
    if !(200..300).contains(&code) {
        return Err(anyhow!("no se pudo iniciar la sesión"));
    }

    let steps = ["en_route", "en_route", "arrived", "in_progress", "completed"];
    for (i, status) in steps.iter().enumerate() {
        // Pequeño desplazamiento en cada paso
        let offset = i as f64 * 0.002;
        println!();
        println!("{} {}", "➡️  Paso:".bright_blue(), status);
        api.ping(&team_id, lat + offset, lng + offset, status).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    println!("{}", "🏁 Simulación terminada".bright_green().bold());
    Ok(())
}

async fn show_snapshot(api: &Api) -> Result<()> {
    let (code, body) = api.get("/api/tracking/snapshot").await?;
    if !(200..300).contains(&code) {
        print_response(code, &body);
        return Ok(());
    }

    println!("{}", "🗺️  EQUIPOS".bright_cyan().bold());
    for crew in body["crews"].as_array().into_iter().flatten() {
        println!(
            "  {} [{}] actual: {} siguiente: {}",
            crew["name"].as_str().unwrap_or("?").bold(),
            crew["status"].as_str().unwrap_or("?"),
            crew["currentJob"]["displayId"].as_str().unwrap_or("-"),
            crew["nextJob"]["displayId"].as_str().unwrap_or("-"),
        );
    }

    println!("{}", "🚚 SESIONES ACTIVAS".bright_cyan().bold());
    for session in body["activeSessions"].as_array().into_iter().flatten() {
        println!(
            "  {} {} ({})",
            session["id"].as_str().unwrap_or("?"),
            session["status"].as_str().unwrap_or("?"),
            session["job_type"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}

async fn generate_eod(api: &Api) -> Result<()> {
    println!("{}", "📊 REPORTES EOD".bright_cyan().bold());
    let date = prompt("Fecha (YYYY-MM-DD, vacío = hoy): ")?;
    let date = if date.is_empty() {
        Utc::now().format("%Y-%m-%d").to_string()
    } else {
        date
    };

    let (code, body) = api
        .post("/api/eod/reports/generate", &json!({ "date": date }))
        .await?;
    if !(200..300).contains(&code) {
        print_response(code, &body);
        return Ok(());
    }

    for report in body["data"]["reports"].as_array().into_iter().flatten() {
        let summary = &report["summary"];
        let line = format!(
            "  {}: {} completados, {} cancelados, firma {}%, {} min promedio",
            report["teamName"].as_str().unwrap_or("?"),
            summary["jobsCompleted"],
            summary["jobsCancelled"],
            summary["signOffRate"],
            summary["avgDuration"],
        );
        match report["error"].as_str() {
            Some(error) => println!("{} ({})", line.bright_red(), error),
            None => println!("{}", line),
        }
    }
    Ok(())
}

async fn watch_stream(api: &Api) -> Result<()> {
    let max_events: usize = prompt("Cantidad de eventos a escuchar: ")?
        .parse()
        .unwrap_or(5);

    println!("{}", "📡 Conectando al stream...".bright_cyan());
    let response = api.client.get(api.url("/api/tracking/stream")).send().await?;
    let mut stream = response.bytes_stream();

    let mut buffer = String::new();
    let mut received = 0;
    while received < max_events {
        let Some(chunk) = stream.next().await else {
            println!("{}", "📴 Stream cerrado por el servidor".bright_yellow());
            break;
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk?));

        while let Some(end) = buffer.find("\n\n") {
            let event: String = buffer.drain(..end + 2).collect();
            if let Some(data) = event.lines().find_map(|l| l.strip_prefix("data: ")) {
                received += 1;
                println!("{} {}", format!("#{}", received).bright_blue(), data);
            }
        }
    }
    Ok(())
}
