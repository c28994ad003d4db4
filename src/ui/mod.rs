use crate::core::config::Config;
use crate::core::session::{LocalStorageSession, Session};
use crate::core::state::{answer_count, Message, Role};
use crate::services::api::HttpStoryApi;
use crate::services::auth::{AuthService, FormErrors};
use crate::services::chat::{ChatController, SubmitOutcome};
use crate::utils::route::story_id_from_path;
use leptos::*;
use std::sync::Arc;

fn current_story_id() -> Option<u64> {
    let path = web_sys::window()?.location().pathname().ok()?;
    story_id_from_path(&path)
}

#[component]
pub fn App() -> impl IntoView {
    let config = Config::default();
    let session: Arc<dyn Session> = Arc::new(LocalStorageSession::new());

    let api = match HttpStoryApi::new(&config.api) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            return view! { <p>"Invalid API configuration: " {e.to_string()}</p> }.into_view();
        }
    };

    let auth = store_value(Arc::new(AuthService::new(api.clone(), session.clone())));
    let (logged_in, set_logged_in) = create_signal(session.token().is_some());

    let on_login = Callback::new(move |_: ()| set_logged_in.set(true));
    let on_logout = Callback::new(move |_: ()| set_logged_in.set(false));

    // One controller per page, so the conversation survives a re-login
    let controller = store_value(current_story_id().map(|story_id| {
        Arc::new(ChatController::new(
            api.clone(),
            session.clone(),
            story_id,
            &config.genre,
        ))
    }));

    let chat = move || match controller.get_value() {
        Some(controller) => {
            view! { <ChatView controller=controller auth=auth.get_value() on_logout=on_logout/> }
                .into_view()
        }
        None => view! { <p>"Open /chat/<story id> to start writing."</p> }.into_view(),
    };

    view! {
        <div class="app-container">
            <h1>"Storyteller"</h1>
            {move || if logged_in.get() {
                chat()
            } else {
                view! { <LoginForm auth=auth.get_value() on_login=on_login/> }.into_view()
            }}
        </div>
    }
    .into_view()
}

#[component]
pub fn LoginForm(auth: Arc<AuthService>, #[prop(into)] on_login: Callback<()>) -> impl IntoView {
    let (email, set_email) = create_signal(String::new());
    let (password, set_password) = create_signal(String::new());
    let (errors, set_errors) = create_signal(FormErrors::default());
    let (pending, set_pending) = create_signal(false);
    let auth = store_value(auth);

    let on_submit = move |ev: leptos::ev::SubmitEvent| {
        ev.prevent_default();
        if pending.get_untracked() {
            return;
        }
        set_pending.set(true);
        let auth = auth.get_value();
        let email = email.get_untracked();
        let password = password.get_untracked();
        spawn_local(async move {
            match auth.login(&email, &password).await {
                Ok(()) => {
                    set_errors.set(FormErrors::default());
                    on_login.call(());
                }
                Err(e) => set_errors.set(e),
            }
            set_pending.set(false);
        });
    };

    view! {
        <form class="login-form" on:submit=on_submit>
            <h2>"Sign in"</h2>
            <input type="email" placeholder="Email"
                prop:value=move || email.get()
                on:input=move |ev| set_email.set(event_target_value(&ev))/>
            <p class="field-error">{move || errors.get().email}</p>
            <input type="password" placeholder="Password"
                prop:value=move || password.get()
                on:input=move |ev| set_password.set(event_target_value(&ev))/>
            <p class="field-error">{move || errors.get().password}</p>
            <button type="submit" disabled=move || pending.get()>"Sign in"</button>
        </form>
    }
}

#[component]
pub fn ChatView(
    controller: Arc<ChatController>,
    auth: Arc<AuthService>,
    #[prop(into)] on_logout: Callback<()>,
) -> impl IntoView {
    let (messages, set_messages) = create_signal(controller.transcript().messages().to_vec());
    let (input, set_input) = create_signal(String::new());
    let (busy, set_busy) = create_signal(false);
    let (notice, set_notice) = create_signal(None::<String>);
    let controller = store_value(controller);
    let auth = store_value(auth);

    let send = move || {
        let text = input.get_untracked();
        if busy.get_untracked() || text.trim().is_empty() {
            return;
        }
        // The server rejects an interview reply whose line count is off
        if let Some(expected) = controller.get_value().expected_answers() {
            let given = answer_count(&text);
            if given != expected {
                set_notice.set(Some(format!(
                    "Please give {} answers, one per line ({} given).",
                    expected, given
                )));
                return;
            }
        }
        // Echo right away; the controller's transcript replaces this on reply
        set_messages.update(|m| m.push(Message::user(text.trim())));
        set_input.set(String::new());
        set_busy.set(true);
        set_notice.set(None);

        let controller = controller.get_value();
        spawn_local(async move {
            let outcome = controller.submit(&text).await;
            set_messages.set(controller.transcript().messages().to_vec());
            set_busy.set(false);
            match outcome {
                SubmitOutcome::LoginRequired => on_logout.call(()),
                SubmitOutcome::Failed(reason) => set_notice.set(Some(reason)),
                SubmitOutcome::Applied { step, .. } => {
                    if let Some(count) = controller.expected_answers() {
                        set_notice.set(Some(format!(
                            "Step {}: answer each of the {} questions on its own line.",
                            step, count
                        )));
                    }
                }
                _ => {}
            }
        });
    };

    let on_keydown = move |ev: leptos::ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            send();
        }
    };

    let on_restart = move |_| {
        controller.get_value().reset();
        set_messages.set(Vec::new());
        set_notice.set(None);
    };

    let on_logout_click = move |_| {
        let auth = auth.get_value();
        spawn_local(async move {
            auth.logout().await;
            on_logout.call(());
        });
    };

    view! {
        <div class="chat">
            <div class="chat-controls">
                <button on:click=on_restart disabled=move || busy.get()>"Start over"</button>
                <button on:click=on_logout_click>"Log out"</button>
            </div>
            <div class="chat-messages">
                <For
                    each=move || messages.get().into_iter().enumerate()
                    key=|(i, message)| (*i, message.produced_at)
                    children=move |(_, message)| view! { <MessageBubble message=message/> }
                />
                <Show when=move || busy.get()>
                    <div class="loading">"..."</div>
                </Show>
            </div>
            <p class="notice">{move || notice.get()}</p>
            <div class="chat-input">
                <textarea
                    placeholder="Type your message... (Press Enter to send, Shift+Enter for new line)"
                    prop:value=move || input.get()
                    on:input=move |ev| set_input.set(event_target_value(&ev))
                    on:keydown=on_keydown
                    disabled=move || busy.get()
                />
                <button
                    on:click=move |_| send()
                    disabled=move || busy.get() || input.get().trim().is_empty()
                >
                    "Send"
                </button>
            </div>
        </div>
    }
}

#[component]
fn MessageBubble(message: Message) -> impl IntoView {
    let class = match message.role {
        Role::User => "message user",
        Role::Assistant => "message assistant",
    };
    let time = message
        .produced_at
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S")
        .to_string();
    let lines = message
        .content
        .split('\n')
        .map(|line| view! { <span>{line.to_string()}</span><br/> })
        .collect_view();

    view! {
        <div class=class>
            <div class="content">{lines}</div>
            <div class="time">{time}</div>
        </div>
    }
}
