use std::io::{self, Write};

/// A line typed at the console prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect,
    Disconnect,
    ToggleStream,
    Press(f64, f64),
    Drag(f64, f64),
    Release,
    Stats,
    Save(String),
    Help,
    Quit,
    /// Anything that is not a slash command goes to the rover verbatim.
    Send(String),
}

pub fn show_help(width: f64, height: f64) {
    println!("===========================================");
    println!("Rover Console");
    println!("===========================================");
    println!("Type a message and press Enter to send it.");
    println!("Commands:");
    println!("  /connect            connect to the configured device");
    println!("  /disconnect         disconnect and stop streaming");
    println!("  /stream             toggle joystick streaming");
    println!("  /press <px> <py>    touch the pad ({width}x{height})");
    println!("  /drag <px> <py>     move the touch");
    println!("  /release            lift the touch");
    println!("  /stats              round-trip and link statistics");
    println!("  /save <file.csv>    export round-trip samples");
    println!("  /help               show this help");
    println!("  /quit               exit");
    println!("===========================================");
}

pub fn prompt() {
    print!("> ");
    // A prompt that fails to flush only shows up late.
    let _ = io::stdout().flush();
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match (name, args.as_slice()) {
        ("connect", []) => Ok(Command::Connect),
        ("disconnect", []) => Ok(Command::Disconnect),
        ("stream", []) => Ok(Command::ToggleStream),
        ("press", [px, py]) => parse_point(px, py).map(|(x, y)| Command::Press(x, y)),
        ("drag", [px, py]) => parse_point(px, py).map(|(x, y)| Command::Drag(x, y)),
        ("release", []) => Ok(Command::Release),
        ("stats", []) => Ok(Command::Stats),
        ("save", [path]) => Ok(Command::Save(path.to_string())),
        ("help", []) => Ok(Command::Help),
        ("quit" | "exit", []) => Ok(Command::Quit),
        ("press" | "drag", _) => Err(format!("usage: /{name} <px> <py>")),
        ("save", _) => Err("usage: /save <file.csv>".to_string()),
        _ => Err(format!("unknown command '/{name}', try /help")),
    }
}

fn parse_point(px: &str, py: &str) -> Result<(f64, f64), String> {
    let x = px.parse::<f64>().map_err(|_| format!("not a number: {px}"))?;
    let y = py.parse::<f64>().map_err(|_| format!("not a number: {py}"))?;
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent_verbatim() {
        assert_eq!(
            parse_command(" hello rover "),
            Ok(Command::Send(" hello rover ".to_string()))
        );
        assert_eq!(parse_command(""), Ok(Command::Send(String::new())));
    }

    #[test]
    fn pointer_commands_take_two_numbers() {
        assert_eq!(parse_command("/press 10 20.5"), Ok(Command::Press(10.0, 20.5)));
        assert_eq!(parse_command("/drag -3 4"), Ok(Command::Drag(-3.0, 4.0)));
        assert!(parse_command("/press 10").is_err());
        assert!(parse_command("/drag a b").is_err());
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(parse_command("/launch").is_err());
        assert!(parse_command("/connect now").is_err());
        assert_eq!(parse_command("/save out.csv"), Ok(Command::Save("out.csv".into())));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
    }
}
