//! Telegram message templates (legacy Markdown parse mode).

use signal_store::{DailyStats, Signal};

/// Escapes the characters legacy Markdown treats as entity markers, so team
/// names like `Atletico_B` do not break the whole message.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn format_signal_alert(signal: &Signal) -> String {
    format!(
        "🎯 *ALERT@POSTAS - SINAL DETECTADO*\n\n\
         ⚽ *{} vs {}*\n\
         🏆 *Liga:* {}\n\
         📊 *Módulo:* {}\n\
         🎯 *Previsão:* {}\n\
         📈 *Confiança:* {}%\n\
         ⏰ *Hora:* {} UTC\n\n\
         🤖 *Alert@Postas Bot*",
        escape_markdown(&signal.home_team),
        escape_markdown(&signal.away_team),
        escape_markdown(&signal.league),
        escape_markdown(&signal.module),
        escape_markdown(&signal.prediction),
        signal.confidence,
        signal.created_at.format("%d/%m/%Y %H:%M"),
    )
}

pub fn format_signal_update(signal: &Signal) -> String {
    format!(
        "🔄 *ATUALIZAÇÃO DE SINAL*\n\n\
         {}\n\n\
         📊 *Detalhes:*\n\
         • Jogo: {} vs {}\n\
         • Mercado: {}\n\
         • Previsão: {}\n\
         • Resultado: {}\n\
         • Confiança: {}%",
        signal.final_update.as_deref().unwrap_or("⏳ Pendente"),
        escape_markdown(&signal.home_team),
        escape_markdown(&signal.away_team),
        escape_markdown(&signal.module),
        escape_markdown(&signal.prediction),
        escape_markdown(signal.result.as_deref().unwrap_or("-")),
        signal.confidence,
    )
}

pub fn format_daily_report(daily: &DailyStats) -> String {
    let s = &daily.stats;
    let mut msg = format!(
        "📊 *RELATÓRIO DIÁRIO ALERT@POSTAS*\n\
         {}\n\n\
         🎯 *RESUMO GERAL:*\n\
         • Total de Sinais: {}\n\
         • ✅ Greens: {}\n\
         • ❌ Reds: {}\n\
         • ⏳ Pendentes: {}\n\
         • 🎯 Taxa de Acerto: {}%\n\n\
         📈 *BREAKDOWN POR MERCADO:*",
        daily.date.format("%d/%m/%Y"),
        s.total,
        s.greens,
        s.reds,
        s.pending,
        s.accuracy,
    );

    if s.breakdown.is_empty() {
        msg.push_str("\n• Sem sinais");
    }
    for (module, m) in &s.breakdown {
        msg.push_str(&format!(
            "\n• {}: {}G/{}R ({}%)",
            escape_markdown(module),
            m.greens,
            m.reds,
            m.accuracy()
        ));
    }

    msg.push_str(&format!("\n\n💪 *Taxa de acerto do dia: {}%*", s.accuracy));
    msg
}
