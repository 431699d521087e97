use std::sync::mpsc;
use std::thread;

use rustautogui::RustAutoGui;
use tracing::warn;
use windows::Win32::Foundation::POINT;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
    VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::GetCursorPos;

use crate::core::frame::Point;
use crate::core::keys::Key;
use crate::error::{EngineError, Result};
use crate::platform::InputSynth;

struct MoveRequest {
    to: Point,
    reply: mpsc::Sender<Result<()>>,
}

/// Keyboard through `SendInput`, pointer through a thread owning `RustAutoGui`.
pub struct DesktopInput {
    pointer: mpsc::Sender<MoveRequest>,
}

impl DesktopInput {
    pub fn new() -> Result<Self> {
        let (tx, rx) = mpsc::channel::<MoveRequest>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        thread::Builder::new()
            .name("pointer".to_string())
            .spawn(move || {
                let mut gui = match RustAutoGui::new(false) {
                    Ok(gui) => {
                        let _ = ready_tx.send(Ok(()));
                        gui
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(EngineError::InputFailed(format!(
                            "Failed to initialize RustAutoGui: {}",
                            e
                        ))));
                        return;
                    }
                };
                for request in rx {
                    let result = move_pointer(&mut gui, request.to);
                    let _ = request.reply.send(result);
                }
            })?;

        ready_rx
            .recv()
            .map_err(|_| EngineError::InputFailed("pointer thread exited".to_string()))??;
        Ok(Self { pointer: tx })
    }
}

fn move_pointer(gui: &mut RustAutoGui, to: Point) -> Result<()> {
    if to.x < 0 || to.y < 0 {
        return Err(EngineError::InputFailed(format!("pointer target off screen: {:?}", to)));
    }
    gui.move_mouse_to_pos(to.x as u32, to.y as u32, 0.0)
        .map_err(|e| EngineError::InputFailed(format!("move to ({}, {}) failed: {}", to.x, to.y, e)))
}

impl InputSynth for DesktopInput {
    fn press_key(&self, key: Key) -> Result<()> {
        send_key(key, KEYBD_EVENT_FLAGS(0))
    }

    fn release_key(&self, key: Key) -> Result<()> {
        send_key(key, KEYEVENTF_KEYUP)
    }

    fn move_mouse(&self, to: Point) -> Result<()> {
        let (reply, result) = mpsc::channel();
        self.pointer
            .send(MoveRequest { to, reply })
            .map_err(|_| EngineError::InputFailed("pointer thread is gone".to_string()))?;
        result
            .recv()
            .map_err(|_| EngineError::InputFailed("pointer thread is gone".to_string()))?
    }

    fn cursor_position(&self) -> Result<Point> {
        let mut point = POINT::default();
        unsafe { GetCursorPos(&mut point) }
            .map_err(|e| EngineError::InputFailed(format!("GetCursorPos failed: {}", e)))?;
        Ok(Point::new(point.x, point.y))
    }
}

fn send_key(key: Key, flags: KEYBD_EVENT_FLAGS) -> Result<()> {
    let input = INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(virtual_key(key)),
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    };
    let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
    if sent == 1 {
        Ok(())
    } else {
        warn!(%key, "SendInput blocked");
        Err(EngineError::InputFailed(format!("SendInput rejected {}", key)))
    }
}

/// Win32 virtual-key code for `key`.
fn virtual_key(key: Key) -> u16 {
    match key {
        Key::LeftControl => 0xA2,
        Key::LeftShift => 0xA0,
        Key::LeftAlt => 0xA4,
        Key::Space => 0x20,
        Key::ArrowLeft => 0x25,
        Key::ArrowUp => 0x26,
        Key::ArrowRight => 0x27,
        Key::ArrowDown => 0x28,
        other => {
            let label = other.label();
            match label.strip_prefix('F').and_then(|n| n.parse::<u16>().ok()) {
                Some(n) => 0x70 + n - 1,
                // A-Z and 0-9 use their ASCII code
                None => label.as_bytes()[0] as u16,
            }
        }
    }
}
